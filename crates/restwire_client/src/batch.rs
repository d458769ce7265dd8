//! Batch envelope writing and reading.
//!
//! A batch is one `multipart/mixed` POST to `{root}/$batch`. Under
//! `BatchWithSingleChangeset` every side-effecting part nests inside a
//! single atomic changeset; under `BatchWithIndependentOperations` each
//! part stands alone in the outer envelope.

use bytes::Bytes;
use restwire_protocol::{Headers, Method};
use uuid::Uuid;

/// One inner request, fully built and frozen, ready to be written into
/// the envelope.
#[derive(Debug, Clone)]
pub struct SerializedPart {
    /// Part method.
    pub method: Method,
    /// Part URI: absolute, or a `$<content-id>` relative reference.
    pub uri: String,
    /// Part headers.
    pub headers: Headers,
    /// Part body, if any.
    pub body: Option<Bytes>,
    /// Content-ID used for cross-part references.
    pub content_id: usize,
}

/// Writes batch envelopes.
pub struct BatchWriter {
    batch_boundary: String,
    changeset_boundary: String,
}

impl BatchWriter {
    /// Creates a writer with fresh envelope boundaries.
    pub fn new() -> Self {
        Self {
            batch_boundary: format!("batch_{}", Uuid::new_v4()),
            changeset_boundary: format!("changeset_{}", Uuid::new_v4()),
        }
    }

    /// Returns the envelope `Content-Type` header value.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.batch_boundary)
    }

    /// Writes the envelope body.
    ///
    /// With `atomic` set, all parts nest inside one changeset; otherwise
    /// each part is an independent child of the outer envelope.
    pub fn write(&self, parts: &[SerializedPart], atomic: bool) -> Bytes {
        let mut out = String::new();
        if atomic {
            out.push_str(&format!("--{}\r\n", self.batch_boundary));
            out.push_str(&format!(
                "Content-Type: multipart/mixed; boundary={}\r\n\r\n",
                self.changeset_boundary
            ));
            for part in parts {
                self.write_part(&mut out, &self.changeset_boundary, part);
            }
            out.push_str(&format!("--{}--\r\n", self.changeset_boundary));
        } else {
            for part in parts {
                self.write_part(&mut out, &self.batch_boundary, part);
            }
        }
        out.push_str(&format!("--{}--\r\n", self.batch_boundary));
        Bytes::from(out)
    }

    fn write_part(&self, out: &mut String, boundary: &str, part: &SerializedPart) {
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str("Content-Type: application/http\r\n");
        out.push_str("Content-Transfer-Encoding: binary\r\n");
        out.push_str(&format!("Content-ID: {}\r\n\r\n", part.content_id));

        out.push_str(&format!("{} {} HTTP/1.1\r\n", part.method, part.uri));
        for (name, value) in part.headers.iter() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        if let Some(body) = &part.body {
            out.push_str(&String::from_utf8_lossy(body));
            out.push_str("\r\n");
        }
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts per-part statuses and headers from a batch response body.
///
/// Parts are recognized by their `HTTP/1.x <status>` status lines;
/// nesting inside changesets is transparent. Results are in wire order,
/// which mirrors request order.
pub fn read_batch_statuses(body: &[u8]) -> Vec<(u16, Headers)> {
    let text = String::from_utf8_lossy(body);
    let mut results = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("HTTP/1.") else {
            continue;
        };
        let status = rest
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok());
        let Some(status) = status else { continue };

        let mut headers = Headers::new();
        for header_line in lines.by_ref() {
            if header_line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = header_line.split_once(':') {
                headers.set(name.trim(), value.trim());
            }
        }
        results.push((status, headers));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use restwire_protocol::headers;

    fn part(id: usize, method: Method, uri: &str, body: Option<&str>) -> SerializedPart {
        let mut h = Headers::new();
        if body.is_some() {
            h.set(headers::CONTENT_TYPE, "application/json");
        }
        SerializedPart {
            method,
            uri: uri.to_string(),
            headers: h,
            body: body.map(|b| Bytes::from(b.to_string())),
            content_id: id,
        }
    }

    #[test]
    fn single_changeset_nests_all_parts() {
        let writer = BatchWriter::new();
        let parts = vec![
            part(1, Method::Post, "http://svc/Customers", Some("{}")),
            part(2, Method::Post, "$1/Orders", Some("{}")),
        ];
        let body = String::from_utf8_lossy(&writer.write(&parts, true)).into_owned();

        assert_eq!(body.matches("Content-Type: multipart/mixed").count(), 1);
        assert_eq!(body.matches("Content-Type: application/http").count(), 2);
        assert!(body.contains("POST http://svc/Customers HTTP/1.1"));
        assert!(body.contains("POST $1/Orders HTTP/1.1"));
        assert!(body.contains("Content-ID: 1"));
        assert!(body.contains("Content-ID: 2"));
        // Changeset closes before the batch does.
        let changeset_close = body
            .find(&format!("--{}--", writer.changeset_boundary))
            .unwrap();
        let batch_close = body.find(&format!("--{}--", writer.batch_boundary)).unwrap();
        assert!(changeset_close < batch_close);
    }

    #[test]
    fn independent_parts_skip_the_changeset() {
        let writer = BatchWriter::new();
        let parts = vec![
            part(1, Method::Delete, "http://svc/Customers(1)", None),
            part(2, Method::Delete, "http://svc/Customers(2)", None),
        ];
        let body = String::from_utf8_lossy(&writer.write(&parts, false)).into_owned();

        assert!(!body.contains("changeset_"));
        assert_eq!(body.matches("Content-Type: application/http").count(), 2);
    }

    #[test]
    fn boundaries_are_unique_per_writer() {
        let a = BatchWriter::new();
        let b = BatchWriter::new();
        assert_ne!(a.batch_boundary, b.batch_boundary);
        assert_ne!(a.batch_boundary, a.changeset_boundary);
    }

    #[test]
    fn reads_statuses_in_order() {
        let body = b"--batch_x\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 201 Created\r\n\
Location: http://svc/Customers(1)\r\n\
ETag: W/\"7\"\r\n\
\r\n\
{}\r\n\
--batch_x\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 404 Not Found\r\n\
\r\n\
--batch_x--\r\n";

        let statuses = read_batch_statuses(body);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].0, 201);
        assert_eq!(
            statuses[0].1.get("Location"),
            Some("http://svc/Customers(1)")
        );
        assert_eq!(statuses[0].1.get("ETag"), Some("W/\"7\""));
        assert_eq!(statuses[1].0, 404);
        assert!(statuses[1].1.is_empty());
    }

    #[test]
    fn empty_body_reads_no_parts() {
        assert!(read_batch_statuses(b"").is_empty());
    }
}
