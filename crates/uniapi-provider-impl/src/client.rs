use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(100);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(200);

/// The process-wide upstream HTTP client. Streaming responses are read chunk
/// by chunk under the read timeout; no overall request deadline is set so
/// long generations are never cut off mid-stream.
pub fn build_upstream_client() -> Result<wreq::Client, wreq::Error> {
    wreq::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build()
}
