use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stockgate::async_trait::async_trait;
use stockgate::prelude::*;

/// Pretend provider backend that fails every third call with a 503.
#[derive(Debug, Default)]
pub struct FlakyProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl UpstreamHandler for FlakyProvider {
    async fn handle(
        &self,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::info!("upstream call #{} for {}", call + 1, request.path);
        if call % 3 == 2 {
            return Ok(UpstreamResponse::new(503, b"upstream sad".to_vec()));
        }
        Ok(
            UpstreamResponse::new(200, b"{\"photos\": [1, 2, 3]}".to_vec())
                .with_content_type("application/json")
                .with_etag("\"demo-v1\""),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let (sink, mut incidents) = ChannelSink::channel();
    let service = GatewayService::start(GatewayConfig::default(), Arc::new(sink))?;
    let provider = FlakyProvider::default();

    for page in 0..6 {
        let request = UpstreamRequest::get("/api/unsplash/search")
            .with_query("query", "mountains")
            .with_query("page", &(page % 2).to_string());
        match service.middleware().handle(&request, &provider).await {
            Ok(result) => tracing::info!(
                "page {}: {} ({} bytes, cache {})",
                page % 2,
                result.response.status_code,
                result.response.body.len(),
                result.cache_status.as_str(),
            ),
            Err(e) => tracing::warn!("request failed: {}", e),
        }
    }

    let stats = service.cache().stats().await;
    tracing::info!(
        "cache: {} entries, {} hits / {} misses, {} evictions",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.evictions,
    );

    while let Ok(event) = incidents.try_recv() {
        tracing::info!(
            "incident {}: {} ({})",
            event.kind(),
            event.record().id,
            event.record().description,
        );
    }

    service.shutdown().await;
    Ok(())
}
