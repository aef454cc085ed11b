use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("kbchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("kbchat.client.request_errors");
pub(crate) static CLIENT_AUTH_RETRIES: Counter = Counter::new("kbchat.client.auth_retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("kbchat.client.request_duration_seconds");

pub(crate) static REFRESH_ATTEMPTS: Counter = Counter::new("kbchat.refresh.attempts");
pub(crate) static REFRESH_FAILURES: Counter = Counter::new("kbchat.refresh.failures");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("kbchat.stream.events");
pub(crate) static STREAM_MALFORMED: Counter = Counter::new("kbchat.stream.malformed");
pub(crate) static STREAM_BYTES: Counter = Counter::new("kbchat.stream.bytes");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_AUTH_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&REFRESH_ATTEMPTS);
    collector.register_counter(&REFRESH_FAILURES);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_MALFORMED);
    collector.register_counter(&STREAM_BYTES);
}
