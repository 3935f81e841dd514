//! Shared parameter record passed between states.
//!
//! Every machine owns exactly one record. Its mandatory fields are the name
//! of the state to run next and the last reported error; everything else is
//! application data carried from state to state.

use super::error::FsmError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

const RESERVED_FIELDS: [&str; 2] = ["current_state", "error_info"];

/// Description of the last error reported into a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// State that was running when the error happened, if any
    pub state: Option<String>,
    /// Human readable error text
    pub message: String,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(state: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            state: state.map(str::to_owned),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(state: Option<&str>, error: &FsmError) -> Self {
        Self::new(state, error.to_string())
    }
}

/// Contract every shared parameter record fulfils.
///
/// Implement it on a plain struct to get typed fields, or use [`Params`]
/// for a dynamic, field-addressable record.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::{ErrorInfo, ParamsRecord};
///
/// #[derive(Debug, Default)]
/// struct Oven {
///     current_state: Option<String>,
///     error_info: Option<ErrorInfo>,
///     temperature: f64,
/// }
///
/// impl ParamsRecord for Oven {
///     fn current_state(&self) -> Option<&str> {
///         self.current_state.as_deref()
///     }
///     fn set_current_state(&mut self, next: Option<String>) {
///         self.current_state = next;
///     }
///     fn error_info(&self) -> Option<&ErrorInfo> {
///         self.error_info.as_ref()
///     }
///     fn set_error_info(&mut self, info: Option<ErrorInfo>) {
///         self.error_info = info;
///     }
/// }
///
/// let mut oven = Oven::default();
/// oven.transition_to("heat");
/// assert_eq!(oven.current_state(), Some("heat"));
/// ```
pub trait ParamsRecord: Debug + Send {
    /// Name of the state the machine should run next. `None` halts.
    fn current_state(&self) -> Option<&str>;

    fn set_current_state(&mut self, next: Option<String>);

    fn error_info(&self) -> Option<&ErrorInfo>;

    fn set_error_info(&mut self, info: Option<ErrorInfo>);

    /// Refresh hook for externally sourced values.
    ///
    /// Called by placeholder actions; the default does nothing.
    fn update(&mut self) {}

    /// Request a transition to `state`.
    fn transition_to(&mut self, state: &str) {
        self.set_current_state(Some(state.to_owned()));
    }

    /// Request the machine to halt after the current action.
    fn halt(&mut self) {
        self.set_current_state(None);
    }
}

/// Dynamic parameter record with a fixed set of declared fields.
///
/// Fields hold JSON values so any serde type can travel between states.
///
/// # Example
///
/// ```rust
/// use metronome_fsm::core::Params;
///
/// let mut params = Params::new(["count", "label"]);
/// params.set_as("count", 3).unwrap();
/// params.set("label", "test".into()).unwrap();
///
/// assert_eq!(params.get_as::<u32>("count"), Some(3));
/// assert!(params.set("missing", 1.into()).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    current_state: Option<String>,
    error_info: Option<ErrorInfo>,
    fields: BTreeMap<String, Value>,
}

impl Params {
    /// Create a record declaring `fields`, each initialised to `null`.
    ///
    /// Reserved names are silently skipped since they are always present.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|name| !RESERVED_FIELDS.contains(&name.as_str()))
            .map(|name| (name, Value::Null))
            .collect();
        Self {
            current_state: None,
            error_info: None,
            fields,
        }
    }

    /// Create a record from field names and their initial values.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .filter(|(name, _)| !RESERVED_FIELDS.contains(&name.as_str()))
            .collect();
        Self {
            current_state: None,
            error_info: None,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Overwrite a declared field.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), FsmError> {
        if RESERVED_FIELDS.contains(&field) {
            return Err(FsmError::InvalidArgument(format!(
                "'{field}' is reserved, use the ParamsRecord accessors"
            )));
        }
        match self.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FsmError::InvalidArgument(format!(
                "no field named '{field}' in params"
            ))),
        }
    }

    /// Read a field as `T`. Returns `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.fields
            .get(field)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set_as<T: Serialize>(&mut self, field: &str, value: T) -> Result<(), FsmError> {
        let value = serde_json::to_value(value)
            .map_err(|e| FsmError::InvalidArgument(format!("field '{field}': {e}")))?;
        self.set(field, value)
    }

    /// Names of the declared user fields, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

impl ParamsRecord for Params {
    fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    fn set_current_state(&mut self, next: Option<String>) {
        self.current_state = next;
    }

    fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    fn set_error_info(&mut self, info: Option<ErrorInfo>) {
        self.error_info = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_declares_fields_as_null() {
        let params = Params::new(["count", "par2"]);
        assert_eq!(params.get("count"), Some(&Value::Null));
        assert_eq!(params.fields().collect::<Vec<_>>(), vec!["count", "par2"]);
        assert!(params.current_state().is_none());
        assert!(params.error_info().is_none());
    }

    #[test]
    fn set_rejects_undeclared_fields() {
        let mut params = Params::new(["count"]);
        let err = params.set("speed", json!(1)).unwrap_err();
        assert!(matches!(err, FsmError::InvalidArgument(_)));
    }

    #[test]
    fn reserved_fields_are_not_user_fields() {
        let mut params = Params::new(["current_state", "count"]);
        assert!(!params.contains("current_state"));
        assert!(params.set("error_info", json!("boom")).is_err());
    }

    #[test]
    fn typed_access_round_trips_through_serde() {
        let mut params = Params::new(["count"]);
        params.set_as("count", 41u32).unwrap();
        assert_eq!(params.get_as::<u32>("count"), Some(41));
        assert_eq!(params.get_as::<String>("count"), None);
    }

    #[test]
    fn transition_helpers_drive_current_state() {
        let mut params = Params::default();
        params.transition_to("Idle");
        assert_eq!(params.current_state(), Some("Idle"));
        params.halt();
        assert_eq!(params.current_state(), None);
    }

    #[test]
    fn error_info_records_state_and_message() {
        let mut params = Params::default();
        let err = FsmError::action("Idle", "overheat");
        params.set_error_info(Some(ErrorInfo::from_error(Some("Idle"), &err)));

        let info = params.error_info().unwrap();
        assert_eq!(info.state.as_deref(), Some("Idle"));
        assert!(info.message.contains("overheat"));
    }

    #[test]
    fn from_pairs_keeps_initial_values() {
        let params = Params::from_pairs([("count", json!(0)), ("par2", json!("test"))]);
        assert_eq!(params.get_as::<i64>("count"), Some(0));
        assert_eq!(params.get_as::<String>("par2").as_deref(), Some("test"));
    }
}
