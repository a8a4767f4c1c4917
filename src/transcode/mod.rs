//! The per-document pipeline: pick a strategy, rewrite every page, strip
//! annotations, and save with a container profile.

pub mod annotations;
pub mod document;
pub mod image;
pub mod page;
pub mod profile;
pub mod raster;
pub mod source;
pub mod strategy;
pub mod text;

pub use annotations::{strip_annotations, StripReport};
pub use document::{AssemblyReport, DocumentAssembler};
pub use self::image::{reduce_image, EncodedImage};
pub use page::{PageOutcome, PageTranscoder, SourceSizeFlags};
pub use profile::SaveProfile;
pub use raster::{select_renderer, PageRenderer, RenderSession, XObjectRenderer};
pub use source::{SourceDocument, SourcePage};
pub use strategy::PageStrategy;
pub use text::{extract_text_runs, TextRun};
