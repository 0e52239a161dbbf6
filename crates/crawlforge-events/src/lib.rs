//! Hook runtime (§4.11): a fixed set of lifecycle points a page session
//! fires in order, each running its registered hooks in registration
//! order. Unlike the general event bus this is trimmed from, there is no
//! pub/sub routing or event typing here — just an ordered callback list
//! per point, because the page session is the only emitter and hooks are
//! the only subscriber kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use crawlforge_types::config::HookPoint;
use crawlforge_types::ports::PageHandle;
use crawlforge_types::CrawlError;
use tracing::warn;

/// What a hook sees and may replace. Hooks that don't need a replacement
/// page leave `replacement` as `None`.
pub struct HookContext<'a> {
    pub page: &'a dyn PageHandle,
    pub url: Option<String>,
    pub session_id: Option<String>,
    pub replacement: Option<Box<dyn PageHandle>>,
}

impl<'a> HookContext<'a> {
    pub fn new(page: &'a dyn PageHandle) -> Self {
        Self {
            page,
            url: None,
            session_id: None,
            replacement: None,
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &mut HookContext<'_>) -> Result<(), CrawlError>;
}

/// Ordered, per-point hook registration. Built once per crawl alongside
/// (but separate from) `CrawlerRunConfig`, since hook closures aren't
/// serializable data.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<HookPoint, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, point: HookPoint, hook: Arc<dyn Hook>) {
        self.hooks.entry(point).or_default().push(hook);
    }

    /// Fires every hook registered at `point`, in registration order.
    /// A non-critical hook's error is captured as a warning string and the
    /// next hook still runs; a critical hook's error aborts immediately.
    pub async fn fire(
        &self,
        point: HookPoint,
        ctx: &mut HookContext<'_>,
        critical: &[HookPoint],
    ) -> Result<Vec<String>, CrawlError> {
        let mut warnings = Vec::new();
        let is_critical = critical.contains(&point);

        let Some(hooks) = self.hooks.get(&point) else {
            return Ok(warnings);
        };

        for hook in hooks {
            if let Err(e) = hook.call(ctx).await {
                if is_critical {
                    return Err(e);
                }
                warn!(point = ?point, error = %e, "non-critical hook failed");
                warnings.push(format!("{point:?}: {e}"));
            }
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlforge_types::ports::PageHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopPage;

    #[async_trait]
    impl PageHandle for NoopPage {
        async fn goto(&self, _url: &str, _timeout: std::time::Duration) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String, CrawlError> {
            Ok("https://example.com".into())
        }
        async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, CrawlError> {
            Ok(serde_json::Value::Null)
        }
        async fn content(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout: std::time::Duration) -> Result<bool, CrawlError> {
            Ok(true)
        }
        async fn screenshot_png_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn pdf_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn set_extra_headers(&self, _headers: &[(String, String)]) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl Hook for CountingHook {
        async fn call(&self, _ctx: &mut HookContext<'_>) -> Result<(), CrawlError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Hook for FailingHook {
        async fn call(&self, _ctx: &mut HookContext<'_>) -> Result<(), CrawlError> {
            Err(CrawlError::internal("hook", "boom"))
        }
    }

    #[tokio::test]
    async fn hooks_fire_in_registration_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.register(HookPoint::BeforeGoto, Arc::new(CountingHook(counter.clone())));
        registry.register(HookPoint::BeforeGoto, Arc::new(CountingHook(counter.clone())));

        let page = NoopPage;
        let mut ctx = HookContext::new(&page);
        let warnings = registry.fire(HookPoint::BeforeGoto, &mut ctx, &[]).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_critical_hook_failure_becomes_a_warning() {
        let mut registry = HookRegistry::new();
        registry.register(HookPoint::AfterGoto, Arc::new(FailingHook));

        let page = NoopPage;
        let mut ctx = HookContext::new(&page);
        let warnings = registry.fire(HookPoint::AfterGoto, &mut ctx, &[]).await.unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn critical_hook_failure_aborts() {
        let mut registry = HookRegistry::new();
        registry.register(HookPoint::AfterGoto, Arc::new(FailingHook));

        let page = NoopPage;
        let mut ctx = HookContext::new(&page);
        let result = registry
            .fire(HookPoint::AfterGoto, &mut ctx, &[HookPoint::AfterGoto])
            .await;
        assert!(result.is_err());
    }
}
