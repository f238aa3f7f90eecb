//! Compiled subscription predicates.
//!
//! A [`Matcher`] is built once per listener, when the listener enters the
//! dispatch set, so the hot path evaluates precompiled regexes only.
//! Compilation failures surface at listener construction, never at match
//! time.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{CoreError, Result};

/// The only matcher field the dispatcher currently understands.
pub const DEVICE_ID_FIELD: &str = "device_id";

/// Compiled predicate evaluating `(event, device_id)` against a listener's
/// subscription.
///
/// The event name must fully match at least one event regex. Device-id
/// matching is skipped entirely when no `device_id` matchers were
/// registered; a literal `.*` entry acts as a wildcard. A listener that
/// asks to match on a field this dispatcher does not understand matches
/// nothing.
#[derive(Debug)]
pub struct Matcher {
    events: Vec<Regex>,
    device_ids: Vec<Regex>,
    match_any_device: bool,
    unknown_field: bool,
}

impl Matcher {
    /// Compiles a matcher from a listener's raw subscription lists.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoEvents` when the event list is empty, or a
    /// regex compilation error for any malformed pattern.
    pub fn compile(events: &[String], matchers: &HashMap<String, Vec<String>>) -> Result<Self> {
        if events.is_empty() {
            return Err(CoreError::NoEvents);
        }

        let events = events
            .iter()
            .map(|pattern| {
                full_match(pattern).map_err(|source| CoreError::InvalidEventRegex {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let unknown_field = matchers.keys().any(|field| field != DEVICE_ID_FIELD);

        let mut match_any_device = false;
        let mut device_ids = Vec::new();
        if let Some(patterns) = matchers.get(DEVICE_ID_FIELD) {
            for pattern in patterns {
                if pattern == ".*" {
                    match_any_device = true;
                }
                device_ids.push(full_match(pattern).map_err(|source| {
                    CoreError::InvalidMatcherRegex { pattern: pattern.clone(), source }
                })?);
            }
        }

        Ok(Self { events, device_ids, match_any_device, unknown_field })
    }

    /// Returns true when a job with this event name and device id should be
    /// delivered to the listener.
    pub fn accepts(&self, event: &str, device_id: &str) -> bool {
        if self.unknown_field {
            return false;
        }

        if !self.events.iter().any(|re| re.is_match(event)) {
            return false;
        }

        if self.device_ids.is_empty() || self.match_any_device {
            return true;
        }

        self.device_ids.iter().any(|re| re.is_match(device_id))
    }
}

/// Anchors a pattern so it must match the whole input string.
fn full_match(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(ToString::to_string).collect()
    }

    fn device_matchers(patterns: &[&str]) -> HashMap<String, Vec<String>> {
        let mut matchers = HashMap::new();
        matchers
            .insert(DEVICE_ID_FIELD.to_string(), patterns.iter().map(ToString::to_string).collect());
        matchers
    }

    #[test]
    fn event_must_match_subscription() {
        let matcher = Matcher::compile(&events(&["iot", "test"]), &HashMap::new()).unwrap();

        assert!(matcher.accepts("iot", "mac:112233445566"));
        assert!(matcher.accepts("test", "mac:112233445566"));
        assert!(!matcher.accepts("no-match", "mac:112233445566"));
    }

    #[test]
    fn event_match_covers_the_whole_name() {
        let matcher = Matcher::compile(&events(&["iot"]), &HashMap::new()).unwrap();

        assert!(!matcher.accepts("riots", "mac:112233445566"));
        assert!(!matcher.accepts("iot-extended", "mac:112233445566"));
    }

    #[test]
    fn missing_device_matcher_accepts_any_device() {
        let matcher = Matcher::compile(&events(&["iot"]), &HashMap::new()).unwrap();

        assert!(matcher.accepts("iot", "mac:000000000000"));
        assert!(matcher.accepts("iot", ""));
    }

    #[test]
    fn device_matcher_restricts_devices() {
        let matcher = Matcher::compile(
            &events(&["iot"]),
            &device_matchers(&["mac:112233445566", "mac:112233445565"]),
        )
        .unwrap();

        assert!(matcher.accepts("iot", "mac:112233445566"));
        assert!(matcher.accepts("iot", "mac:112233445565"));
        assert!(!matcher.accepts("iot", "mac:112233445560"));
    }

    #[test]
    fn wildcard_device_matcher_accepts_any_device() {
        let matcher = Matcher::compile(
            &events(&["iot"]),
            &device_matchers(&["mac:112233445566", ".*"]),
        )
        .unwrap();

        assert!(matcher.accepts("iot", "mac:112233445560"));
        assert!(matcher.accepts("iot", "mac:aabbccddeeff"));
    }

    #[test]
    fn unknown_matcher_field_matches_nothing() {
        let mut matchers = HashMap::new();
        matchers.insert("serial_number".to_string(), vec![".*".to_string()]);

        let matcher = Matcher::compile(&events(&["iot"]), &matchers).unwrap();

        assert!(!matcher.accepts("iot", "mac:112233445566"));
    }

    #[test]
    fn empty_event_list_rejected() {
        let err = Matcher::compile(&[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::NoEvents));
    }

    #[test]
    fn malformed_event_regex_rejected() {
        let err = Matcher::compile(&events(&["iot(.*"]), &HashMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEventRegex { .. }));
    }

    #[test]
    fn malformed_device_regex_rejected() {
        let err =
            Matcher::compile(&events(&["iot"]), &device_matchers(&["[[:112233445566"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidMatcherRegex { .. }));
    }
}
