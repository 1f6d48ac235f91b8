//! Prometheus counters for the HTTP surface.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub status: String,
}

/// Counters are cheap handles onto shared atomics; the registry keeps a copy
/// of each for encoding.
pub struct Metrics {
    registry: Registry,
    pub votes_cast: Counter,
    pub vote_conflicts: Counter,
    pub http_requests: Family<RequestLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let votes_cast = Counter::default();
        registry.register("votes_cast", "Votes recorded", votes_cast.clone());

        let vote_conflicts = Counter::default();
        registry.register(
            "vote_conflicts",
            "Votes rejected because the address already voted on the post",
            vote_conflicts.clone(),
        );

        let http_requests = Family::<RequestLabels, Counter>::default();
        registry.register(
            "http_requests",
            "HTTP requests by method and status",
            http_requests.clone(),
        );

        Self {
            registry,
            votes_cast,
            vote_conflicts,
            http_requests,
        }
    }

    pub fn record_request(&self, method: &str, status: u16) {
        self.http_requests
            .get_or_create(&RequestLabels {
                method: method.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}
