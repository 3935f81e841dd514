//! Macros for ergonomic record construction.

/// Build a [`Params`](crate::core::Params) record with initial values.
///
/// Each value goes through `serde_json::json!`, so anything serializable
/// works.
///
/// # Example
///
/// ```
/// use metronome_fsm::params;
/// use metronome_fsm::core::ParamsRecord;
///
/// let params = params! {
///     count => 0,
///     par2 => "test",
/// };
///
/// assert_eq!(params.get_as::<u32>("count"), Some(0));
/// assert_eq!(params.get_as::<String>("par2").as_deref(), Some("test"));
/// assert!(params.current_state().is_none());
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::core::Params::default()
    };
    ($($field:ident => $value:expr),+ $(,)?) => {
        $crate::core::Params::from_pairs([
            $((stringify!($field), $crate::__private::serde_json::json!($value))),+
        ])
    };
}
