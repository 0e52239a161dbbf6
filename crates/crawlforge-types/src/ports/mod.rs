//! Capability ports (§6): the abstract collaborators the engine consumes.
//!
//! Every trait here is object-safe (`dyn Trait`) so a concrete provider is
//! selected once, during config build, and injected — never reached for
//! ambiently (§9 design notes: "replace with an injected capability object").

pub mod browser;
pub mod embedding;
pub mod http;
pub mod llm;
pub mod storage;

pub use browser::{
    BrowserDriver, BrowserLauncher, CapturedConsoleMessage, CapturedRequest, CertificateInfo,
    PageHandle,
};
pub use embedding::Embedder;
pub use http::HttpClient;
pub use llm::{Llm, LlmOptions};
pub use storage::Storage;
