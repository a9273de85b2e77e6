//! Records of remote operation calls.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::QueryId;
use crate::schema::QualifiedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(uuid::Uuid);

impl CallId {
    /// Creates a new random call ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol-specific description of the exchange an invoker performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ExchangeMetadata {
    Http {
        verb: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    Sql {
        statement: String,
    },
    Message {
        topic: String,
    },
    #[default]
    None,
}

/// One remote call made while answering a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub call_id: CallId,
    pub query_id: QueryId,
    pub service: QualifiedName,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Number of values returned; `None` for streams still being read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
    #[serde(default)]
    pub exchange: ExchangeMetadata,
}

impl RemoteCall {
    /// `Service@@operation` of the call.
    pub fn qualified_operation(&self) -> String {
        format!("{}@@{}", self.service, self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_metadata_tagged_by_protocol() {
        let http = ExchangeMetadata::Http {
            verb: "GET".to_string(),
            url: "http://clients/jim01".to_string(),
            status: Some(200),
        };
        let json = serde_json::to_value(&http).unwrap();
        assert_eq!(json["protocol"], "http");
        assert_eq!(json["status"], 200);
        assert_eq!(ExchangeMetadata::default(), ExchangeMetadata::None);
    }

    #[test]
    fn call_ids_are_unique() {
        assert_ne!(CallId::new(), CallId::new());
    }

    #[test]
    fn remote_call_round_trip() {
        let call = RemoteCall {
            call_id: CallId::new(),
            query_id: QueryId::new(),
            service: QualifiedName::new("demo", "ClientService"),
            operation: "findClient".to_string(),
            started_at: Utc::now(),
            duration_ms: 4,
            result_count: Some(1),
            exchange: ExchangeMetadata::Sql {
                statement: "select * from clients".to_string(),
            },
        };
        assert_eq!(call.qualified_operation(), "demo.ClientService@@findClient");
        let json = serde_json::to_string(&call).unwrap();
        let back: RemoteCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }
}
