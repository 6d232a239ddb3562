//! State synchronization: a local copy of a value kept convergent with a
//! remote path ([`RemoteState`]) or with same-device storage
//! ([`LocalState`]).

pub mod hub;
pub mod local_state;
pub mod memory;
pub mod remote;
pub mod remote_state;
pub mod sqlite;

pub use hub::SubscriberHub;
pub use local_state::LocalState;
pub use memory::MemoryRemote;
pub use remote::{RemoteEvent, RemoteStore, Subscription};
pub use remote_state::{PendingWrite, RemoteState};
pub use sqlite::SqliteRemote;

use serde_json::Value;

/// A write to a synchronized value: either the whole new value, or a
/// function of the value it replaces.
pub enum SetValue<T> {
    Replace(T),
    Update(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> SetValue<T> {
    pub fn update<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        SetValue::Update(Box::new(f))
    }

    pub fn apply(self, previous: &T) -> T {
        match self {
            SetValue::Replace(value) => value,
            SetValue::Update(f) => f(previous),
        }
    }
}

impl<T> From<T> for SetValue<T> {
    fn from(value: T) -> Self {
        SetValue::Replace(value)
    }
}

/// `null`, `{}` and `[]` all count as "nothing stored".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_and_update() {
        assert_eq!(SetValue::Replace(3).apply(&1), 3);
        assert_eq!(SetValue::update(|n: &i32| n + 10).apply(&1), 11);
        let from: SetValue<String> = "x".to_string().into();
        assert_eq!(from.apply(&String::new()), "x");
    }

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!({})));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!({ "1": [] })));
        assert!(!is_blank(&json!(0)));
    }
}
