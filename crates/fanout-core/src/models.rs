//! Domain models for listener registrations and delivery jobs.
//!
//! A [`Listener`] is the validated, immutable record of one webhook
//! registration; it is the unit the dispatch set is keyed on (by URL).
//! A [`DeliveryJob`] is one inbound event prepared for fan-out. Both are
//! plain values so they can cross the store and queue boundaries freely.

use std::{collections::HashMap, sync::LazyLock, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{CoreError, Result},
    matcher::Matcher,
};

/// Path shape events arrive on. Device id and event name are lifted out of
/// the inbound target URL with this expression; a non-matching path leaves
/// both empty.
static TARGET_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".*/device/(?P<deviceID>[^/]+)/event/(?P<event>[^/]+).*")
        .expect("target path pattern is a valid regex")
});

/// Extracts `(event, device_id)` from an inbound target URL path.
///
/// Both default to the empty string when the path does not follow the
/// canonical `.../device/<id>/event/<name>` shape.
pub fn parse_event_path(target_url: &str) -> (String, String) {
    match TARGET_PATH.captures(target_url) {
        Some(caps) => {
            let device_id = caps.name("deviceID").map(|m| m.as_str().to_string());
            let event = caps.name("event").map(|m| m.as_str().to_string());
            (event.unwrap_or_default(), device_id.unwrap_or_default())
        },
        None => (String::new(), String::new()),
    }
}

/// A validated listener registration.
///
/// Construction through [`Listener::from_registration`] is the single
/// validation point: a record with an unusable URL, no events, a regex that
/// does not compile, or a malformed failure URL never comes into existence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    /// Destination URL; the primary key of the dispatch set.
    pub url: String,

    /// Advisory content type forwarded as the outbound `Content-Type`.
    #[serde(default)]
    pub content_type: String,

    /// Optional HMAC-SHA1 signing secret for outbound payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Event name regexes; a job's event must fully match at least one.
    pub events: Vec<String>,

    /// Matcher field name to regex list; only `device_id` is recognized.
    #[serde(default)]
    pub matchers: HashMap<String, Vec<String>>,

    /// Instant after which delivery attempts are dropped.
    pub until: DateTime<Utc>,

    /// Optional URL notified when this listener is cut off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,

    /// Remote address that registered this listener.
    #[serde(default)]
    pub address: String,
}

impl Listener {
    /// Builds a listener from a registration payload.
    ///
    /// `address` is the registrant's remote address, captured for audit.
    /// When the payload carries no usable `until`, the deadline becomes
    /// `now + duration`, falling back to `default_ttl` for a zero duration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure; the listener is not created.
    pub fn from_registration(
        registration: Registration,
        address: &str,
        now: DateTime<Utc>,
        default_ttl: Duration,
    ) -> Result<Self> {
        let until = match registration.until {
            Some(until) if until.timestamp() > 0 => until,
            _ => {
                let ttl = if registration.duration > 0 {
                    Duration::from_secs(registration.duration)
                } else {
                    default_ttl
                };
                now + chrono::Duration::from_std(ttl)
                    .map_err(|e| CoreError::InvalidRegistration(e.to_string()))?
            },
        };

        let listener = Self {
            url: registration.config.url,
            content_type: registration.config.content_type,
            secret: registration.config.secret,
            events: registration.events,
            matchers: registration.matcher,
            until,
            failure_url: registration.failure_url,
            address: address.to_string(),
        };
        listener.validate()?;
        Ok(listener)
    }

    /// Re-checks every construction invariant and returns the compiled
    /// matcher.
    ///
    /// Records can also enter the system through the external store, so the
    /// sender performs this validation again before joining the dispatch
    /// set.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<Matcher> {
        validate_url(&self.url).map_err(|reason| CoreError::InvalidUrl {
            url: self.url.clone(),
            reason,
        })?;

        if let Some(failure_url) = &self.failure_url {
            validate_url(failure_url).map_err(|reason| CoreError::InvalidFailureUrl {
                url: failure_url.clone(),
                reason,
            })?;
        }

        Matcher::compile(&self.events, &self.matchers)
    }

    /// Returns true when the other record differs only in `until` or the
    /// registering address, meaning an existing sender can simply be
    /// extended instead of replaced.
    pub fn same_config(&self, other: &Self) -> bool {
        self.url == other.url
            && self.content_type == other.content_type
            && self.secret == other.secret
            && self.events == other.events
            && self.matchers == other.matchers
            && self.failure_url == other.failure_url
    }
}

/// Checks that a URL is absolute with an http(s) scheme and a host.
fn validate_url(raw: &str) -> std::result::Result<(), String> {
    if raw.is_empty() {
        return Err("URL is required".to_string());
    }
    let parsed = Url::parse(raw).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" => {},
        other => return Err(format!("unsupported scheme {other:?}")),
    }
    if parsed.host_str().is_none() {
        return Err("URL has no host".to_string());
    }
    Ok(())
}

/// The `/hook` registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    /// Destination configuration.
    pub config: RegistrationConfig,

    /// Event name regexes to subscribe to.
    #[serde(default)]
    pub events: Vec<String>,

    /// Matcher field name to regex list.
    #[serde(default)]
    pub matcher: HashMap<String, Vec<String>>,

    /// Optional URL notified on cut-off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,

    /// Registration lifetime in seconds, used when `until` is absent.
    #[serde(default)]
    pub duration: u64,

    /// Absolute expiry instant; takes precedence over `duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

/// Destination block of a registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Destination URL.
    pub url: String,

    /// Advisory content type.
    #[serde(default)]
    pub content_type: String,

    /// Optional signing secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// One inbound event prepared for fan-out.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Raw inbound payload, forwarded byte-for-byte.
    pub payload: Bytes,

    /// Content type of the inbound request.
    pub content_type: String,

    /// Inbound request URL path the event arrived on.
    pub target_url: String,

    /// Event name extracted from the target URL.
    pub event: String,

    /// Device id extracted from the target URL.
    pub device_id: String,

    /// Correlation id propagated to every outbound request.
    pub transaction_id: String,

    /// Intake timing, carried for logging.
    pub timestamps: Timestamps,
}

/// Intake timing for one event.
///
/// The only ordering guarantee across the pipeline is
/// `time_received <= time_accepted` and both precede any outbound attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamps {
    /// When the inbound request body was first read.
    pub time_received: Option<DateTime<Utc>>,

    /// When the job was handed to the front-door pool.
    pub time_accepted: Option<DateTime<Utc>>,
}
