//! Built-in Interceptors
//!
//! | priority | interceptor | scope |
//! |---|---|---|
//! | 0 | [`TokenAuthority`] | global |
//! | 10 | [`LocalDispatcher`] | global |
//! | 20 | [`RemoteDispatcher`] | global |
//! | 0 | [`MailInterceptor`] | `signup`, `forget_password` |

mod local;
mod mail;
mod remote;
mod token;

use serde_json::Value;

use super::criteria::CriteriaEvaluator;
use super::error::CoreResult;

pub use local::LocalDispatcher;
pub use mail::MailInterceptor;
pub use remote::{
    HttpTransport, RemoteDispatcher, RemoteReply, RemoteTransport, DEFAULT_REMOTE_TIMEOUT,
};
pub use token::TokenAuthority;

pub const TOKEN_AUTHORITY_PRIORITY: i32 = 0;
pub const LOCAL_DISPATCHER_PRIORITY: i32 = 10;
pub const REMOTE_DISPATCHER_PRIORITY: i32 = 20;

/// Apply an interceptor row's criteria to the hook payload.
/// `None` means the row does not apply.
pub(crate) fn select_payload(
    evaluator: &dyn CriteriaEvaluator,
    criteria: &str,
    payload: &Value,
) -> CoreResult<Option<Value>> {
    if criteria.trim().is_empty() {
        return Ok(Some(payload.clone()));
    }
    evaluator.evaluate(criteria.trim(), payload)
}

/// Bound parameter groups for a callback script.
///
/// An object carrying `params` contributes those; an array of arrays is
/// one group per inner array; an array of objects is one group per object
/// (field values in the order the caller sent them); a flat array or a
/// single object is one group. Anything else runs the callback once
/// without parameters.
pub(crate) fn param_groups(payload: &Value) -> Vec<Vec<Value>> {
    match payload {
        Value::Object(map) => match map.get("params") {
            Some(params) => param_groups(params),
            None => vec![map.values().cloned().collect()],
        },
        Value::Array(items) if items.iter().all(Value::is_array) => items
            .iter()
            .filter_map(|i| i.as_array().cloned())
            .collect(),
        Value::Array(items) if items.iter().all(Value::is_object) => items
            .iter()
            .filter_map(|i| i.as_object().map(|m| m.values().cloned().collect()))
            .collect(),
        Value::Array(items) => vec![items.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::criteria::FieldCriteria;
    use serde_json::json;

    #[test]
    fn test_param_groups_shapes() {
        assert_eq!(
            param_groups(&json!({"params": [[1, "a"], [2, "b"]], "query_params": []})),
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]
        );
        assert_eq!(
            param_groups(&json!([{"id": 7}, {"id": 8}])),
            vec![vec![json!(7)], vec![json!(8)]]
        );
        assert_eq!(param_groups(&json!([1, 2])), vec![vec![json!(1), json!(2)]]);
        let rows: Value = serde_json::from_str(r#"[{"price": 5, "name": "pen"}]"#).unwrap();
        assert_eq!(param_groups(&rows), vec![vec![json!(5), json!("pen")]]);
        assert!(param_groups(&Value::Null).is_empty());
    }

    #[test]
    fn test_select_payload_without_criteria_passes_through() {
        let payload = json!([{"a": 1}]);
        assert_eq!(
            select_payload(&FieldCriteria, "  ", &payload).unwrap(),
            Some(payload.clone())
        );
        assert_eq!(select_payload(&FieldCriteria, "a = 2", &payload).unwrap(), None);
    }
}
