//! Stitch engine: signal sources, content extraction, document assembly and
//! the session runtime that drives the page machine against a host page.
mod accumulate;
mod assets;
mod config;
mod controller;
mod dom;
mod events;
mod export;
mod extract;
mod fetch;
mod filename;
mod host;
mod menu;
mod minify;
mod pattern;
mod persist;
mod replay;
mod runtime;
mod save;
mod signals;
mod store;

pub use accumulate::{DocumentAccumulator, DocumentMeta, Section};
pub use assets::{
    background_urls, collect_asset_urls, fetch_assets, resolve_lazy_sources, substitute_assets,
    AssetFailure,
};
pub use config::{
    CompiledSite, ConfigError, FontFace, RequestRule, RequestRules, SiteConfig, SiteSelectors,
    StylesheetPreset,
};
pub use controller::{SessionController, PREFERENCES_KEY, SESSION_KEY};
pub use dom::{FragmentElement, FragmentNode};
pub use events::{ChannelEventSink, EventSink, NullEventSink, SessionEvent};
pub use export::{
    split_book, write_split, ExportError, ManifestEntry, SplitManifest, SplitPage, MANIFEST_FILE,
};
pub use extract::{
    collapse_trivial_runs, strip_attributes, ContentExtractor, ExtractError, ExtractOptions,
    ExtractedPage, NormalizedFragment,
};
pub use fetch::{
    to_data_url, AssetFetcher, FailureKind, FetchError, FetchMetadata, FetchOutput, FetchSettings,
    ReqwestAssetFetcher,
};
pub use filename::book_filename;
pub use host::{
    ClickPoint, DomObserver, HostError, HostPage, InterceptAction, InterceptRule, RequestCallback,
    RequestClass, RequestInterceptor, SnapshotCallback, Subscription,
};
pub use menu::{CommandId, CommandMenu, MenuAction, MenuBinder, MenuRegistry};
pub use minify::{LightMinifier, Minifier};
pub use pattern::UrlPattern;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use replay::{HostRecord, ReplayScript, ScriptedHost, ScriptedPage};
pub use runtime::{Clock, Collaborators, Command, ScrapeSession, SessionHandle, WeakSessionHandle};
pub use save::{DirectorySaveTarget, SaveError, SaveTarget, SavedBook};
pub use signals::{ContainerFilter, SignalSources};
pub use store::{load_typed, save_typed, FileStore, KeyValueStore, MemoryStore, StoreError};
