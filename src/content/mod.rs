//! Lesson content pipeline: embed parsing and exercise resolution.

pub mod embeds;
pub mod resolver;
pub mod store;

pub use embeds::{
    embed_ids, embed_token, has_embeds, ids_of_type, parse_embeds, ContentSegment, EmbedType,
    ParsedContent, ParsedEmbed,
};
pub use resolver::{find_in_course, resolve, resolve_with_fallback, ResolvedExercise};
pub use store::{ContentStore, CourseConfig, ModuleConfig};
