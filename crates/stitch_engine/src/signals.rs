use std::sync::Arc;

use scraper::{Html, Selector};
use stitch_core::Msg;
use stitch_logging::{stitch_debug, stitch_trace};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{parse_selector, ConfigError, SiteConfig};
use crate::host::{DomObserver, HostError, RequestClass, RequestInterceptor, Subscription};

/// Accepts a render-container snapshot only once the reader has finished
/// laying it out: no inline `style` left and the content element present.
#[derive(Debug, Clone)]
pub struct ContainerFilter {
    content: Selector,
}

impl ContainerFilter {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            content: parse_selector(&site.selectors.content)?,
        })
    }

    pub fn accepts(&self, snapshot: &str) -> bool {
        let fragment = Html::parse_fragment(snapshot);
        let root = fragment.root_element();
        let Some(container) = root
            .children()
            .filter_map(scraper::ElementRef::wrap)
            .next()
        else {
            return false;
        };
        if container.value().attr("style").is_some() {
            return false;
        }
        container.select(&self.content).next().is_some()
    }
}

/// The network and DOM observers of one scrape session.
///
/// Both forward into the session's message queue. They exist only while the
/// page machine has observers attached.
#[derive(Default)]
pub struct SignalSources {
    network: Option<Subscription>,
    dom: Option<Subscription>,
}

impl SignalSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.network.is_some() || self.dom.is_some()
    }

    pub fn attach(
        &mut self,
        site: &SiteConfig,
        interceptor: &dyn RequestInterceptor,
        observer: &dyn DomObserver,
        filter: ContainerFilter,
        tx: UnboundedSender<Msg>,
    ) -> Result<(), HostError> {
        self.detach();

        let net_tx = tx.clone();
        let network = interceptor.intercept(
            site.requests.intercept_rules(),
            Arc::new(move |class, url| {
                stitch_trace!("intercepted {:?} request {}", class, url);
                let msg = match class {
                    RequestClass::ProgressReport => Msg::BodyLoaded,
                    RequestClass::ChapterFetch => Msg::ChapterFetched,
                };
                let _ = net_tx.send(msg);
            }),
        )?;

        let dom = match observer.observe(
            &site.selectors.render_container,
            Arc::new(move |snapshot| {
                if filter.accepts(&snapshot) {
                    let _ = tx.send(Msg::ContainerAppeared(snapshot));
                }
            }),
        ) {
            Ok(dom) => dom,
            Err(err) => {
                network.unsubscribe();
                return Err(err);
            }
        };

        self.network = Some(network);
        self.dom = Some(dom);
        stitch_debug!("signal sources attached");
        Ok(())
    }

    pub fn detach(&mut self) {
        let had_any = self.is_attached();
        if let Some(network) = self.network.take() {
            network.unsubscribe();
        }
        if let Some(dom) = self.dom.take() {
            dom.unsubscribe();
        }
        if had_any {
            stitch_debug!("signal sources detached");
        }
    }
}
