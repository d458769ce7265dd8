//! The read path.
//!
//! Reads go through the same per-operation hook pipeline as writes —
//! BuildingRequest, SendingRequest2, transmit, ReceivingResponse — with
//! no descriptor attached and no registry effects.

use crate::error::{ClientError, ClientResult};
use crate::hooks::{BuildingRequestArgs, ReceivingResponseArgs, SendingRequestArgs};
use crate::save::SaveEngine;
use crate::serializer::Serializer;
use crate::transport::Transport;
use restwire_protocol::{Method, ProtocolVersion, WireRequest, WireResponse};
use restwire_query::{translate, NameResolver, QueryNode, QueryResult, TranslatedUri};

impl<T: Transport, S: Serializer> SaveEngine<T, S> {
    /// Issues a single GET for a relative URI through the hook pipeline.
    pub fn execute_uri(&self, relative_uri: &str) -> ClientResult<WireResponse> {
        let snapshot = self.hook_snapshot();

        let mut building = BuildingRequestArgs {
            method: Method::Get,
            uri: format!("{}/{relative_uri}", self.config().service_root()),
            headers: self.base_read_headers(),
            descriptor: None,
        };
        snapshot.fire_building(&mut building);

        let mut sending = SendingRequestArgs::new(
            building.method,
            building.uri.clone(),
            building.headers,
            None,
        );
        snapshot.fire_sending(&mut sending);

        let request = WireRequest {
            method: building.method,
            uri: building.uri,
            headers: sending.into_headers(),
            body: None,
        };

        self.ensure_not_cancelled()?;
        let response = self.transport().send(&request)?;

        snapshot.fire_receiving(&ReceivingResponseArgs::new(
            response.status,
            response.headers.clone(),
            None,
        ));

        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Operation {
                index: 0,
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }

    /// Runs a prepared query.
    pub fn execute_query(&self, query: &PreparedQuery) -> ClientResult<WireResponse> {
        self.execute_uri(&query.uri.to_uri_string())
    }
}

/// A translated query ready to execute.
///
/// The URI is fixed at construction; running it is a plain GET through
/// the engine's hook pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    uri: TranslatedUri,
}

impl PreparedQuery {
    /// Wraps an already translated URI.
    pub fn new(uri: TranslatedUri) -> Self {
        Self { uri }
    }

    /// Translates a query tree and prepares it for execution.
    pub fn translate(
        node: &QueryNode,
        resolver: &dyn NameResolver,
        version: ProtocolVersion,
    ) -> QueryResult<Self> {
        Ok(Self::new(translate(node, resolver, version)?))
    }

    /// Returns the translated URI.
    pub fn uri(&self) -> &TranslatedUri {
        &self.uri
    }

    /// Executes the query through the engine's read path.
    pub fn run<T: Transport, S: Serializer>(
        &self,
        engine: &SaveEngine<T, S>,
    ) -> ClientResult<WireResponse> {
        engine.execute_query(self)
    }
}
