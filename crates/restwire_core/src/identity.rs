//! Deterministic entity identity computation.

use crate::entity::EntityObject;
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataProvider;
use restwire_protocol::escape_query_part;

/// Computes the resource identity for an entity in a set.
///
/// The identity is the relative resource path `Set(key)`, matching the
/// server's identity-construction rule: key properties in declaration
/// order, a single key rendered bare, composite keys rendered as
/// `Name=literal` pairs. Literals follow the scalar-literal escaping
/// rules (text quoted with `'` doubled, then the query escaping
/// profile).
///
/// Fails with [`CoreError::UnknownSet`] for an unknown set and
/// [`CoreError::UnknownProperty`] if a key property has no value on the
/// entity.
pub fn compute_identity(
    metadata: &dyn MetadataProvider,
    set_name: &str,
    entity: &EntityObject,
) -> CoreResult<String> {
    let type_name = metadata
        .set_type(set_name)
        .ok_or_else(|| CoreError::unknown_set(set_name))?;
    let keys = metadata
        .key_properties(&type_name)
        .ok_or_else(|| CoreError::unknown_set(set_name))?;

    let mut literals = Vec::with_capacity(keys.len());
    for key in &keys {
        let value = entity
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| CoreError::unknown_property(&type_name, key))?;
        literals.push((key, escape_query_part(&value.to_literal())));
    }

    let key_part = if literals.len() == 1 {
        literals.pop().map(|(_, lit)| lit).unwrap_or_default()
    } else {
        literals
            .iter()
            .map(|(name, lit)| format!("{name}={lit}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    Ok(format!("{set_name}({key_part})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StaticMetadata;
    use restwire_protocol::Value;

    fn schema() -> StaticMetadata {
        StaticMetadata::new()
            .add_type("Customer", ["Id"])
            .add_type("OrderDetail", ["OrderId", "ProductId"])
            .add_set("Customers", "Customer")
            .add_set("OrderDetails", "OrderDetail")
    }

    #[test]
    fn single_int_key() {
        let md = schema();
        let e = EntityObject::with_props("Customer", [("Id", Value::Int(42))]);
        assert_eq!(compute_identity(&md, "Customers", &e).unwrap(), "Customers(42)");
    }

    #[test]
    fn single_text_key_is_quoted_and_escaped() {
        let md = StaticMetadata::new()
            .add_type("Customer", ["Code"])
            .add_set("Customers", "Customer");
        let e = EntityObject::with_props("Customer", [("Code", Value::Text("ALF KI".into()))]);
        assert_eq!(
            compute_identity(&md, "Customers", &e).unwrap(),
            "Customers('ALF%20KI')"
        );
    }

    #[test]
    fn composite_key_in_declaration_order() {
        let md = schema();
        let e = EntityObject::with_props(
            "OrderDetail",
            [("ProductId", Value::Int(2)), ("OrderId", Value::Int(1))],
        );
        // Declaration order wins over property-map order.
        assert_eq!(
            compute_identity(&md, "OrderDetails", &e).unwrap(),
            "OrderDetails(OrderId=1,ProductId=2)"
        );
    }

    #[test]
    fn identity_is_stable() {
        let md = schema();
        let e = EntityObject::with_props("Customer", [("Id", Value::Int(5))]);
        let a = compute_identity(&md, "Customers", &e).unwrap();
        let b = compute_identity(&md, "Customers", &e).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_key_fails() {
        let md = schema();
        let e = EntityObject::new("Customer");
        assert!(matches!(
            compute_identity(&md, "Customers", &e),
            Err(CoreError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn unknown_set_fails() {
        let md = schema();
        let e = EntityObject::new("Customer");
        assert!(matches!(
            compute_identity(&md, "Suppliers", &e),
            Err(CoreError::UnknownSet { .. })
        ));
    }
}
