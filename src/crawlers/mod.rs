pub mod attachments;
pub mod crawler;
pub mod render;
pub mod tree;
pub mod web;

pub use attachments::AttachmentStore;
pub use crawler::Crawler;
pub use render::{Renderer, WebDriverRenderer};
pub use web::{Fetched, PageFetcher};
