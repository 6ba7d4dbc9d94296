/// Document ID parsing utilities.
///
/// CouchDB document IDs follow conventions:
/// - Regular: `{id}`
/// - Design: `_design/{name}`
/// - Local (never replicated): `_local/{name}`
///
/// Any other ID starting with `_` is reserved; the store refuses to write it.

const DESIGN_PREFIX: &str = "_design/";
const LOCAL_PREFIX: &str = "_local/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIdKind {
    Regular(String),
    Design(String),
    Local(String),
    Reserved(String),
}

impl DocumentIdKind {
    /// Classify a CouchDB document ID.
    pub fn parse(id: &str) -> Self {
        if let Some(name) = id.strip_prefix(DESIGN_PREFIX) {
            DocumentIdKind::Design(name.to_string())
        } else if let Some(name) = id.strip_prefix(LOCAL_PREFIX) {
            DocumentIdKind::Local(name.to_string())
        } else if id.starts_with('_') {
            DocumentIdKind::Reserved(id.to_string())
        } else {
            DocumentIdKind::Regular(id.to_string())
        }
    }

    /// URL path segments addressing this document below the database path.
    ///
    /// The slash after `_design` and `_local` must stay literal; everything
    /// else is a single segment and gets percent-encoded by the URL builder.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            DocumentIdKind::Regular(id) | DocumentIdKind::Reserved(id) => vec![id.as_str()],
            DocumentIdKind::Design(name) => vec!["_design", name.as_str()],
            DocumentIdKind::Local(name) => vec!["_local", name.as_str()],
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, DocumentIdKind::Reserved(_))
    }
}
