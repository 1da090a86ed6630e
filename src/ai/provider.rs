use async_trait::async_trait;
use bytes::Bytes;

use crate::models::Palette;
use crate::types::AppResult;

/// Text descriptions a concept is generated from.
#[derive(Debug, Clone)]
pub struct ConceptBrief {
    pub logo_description: String,
    pub theme_description: String,
}

#[derive(Debug, Clone)]
pub struct RefinementBrief {
    pub brief: ConceptBrief,
    pub refinement_prompt: String,
    pub preserve_aspects: Vec<String>,
}

/// External generative backend. Every call is a single remote request from
/// the caller's point of view; retries happen inside implementations.
#[async_trait]
pub trait ConceptGenerator: Send + Sync {
    async fn generate_image(&self, brief: &ConceptBrief) -> AppResult<Bytes>;

    async fn refine_image(&self, image: &Bytes, refinement: &RefinementBrief) -> AppResult<Bytes>;

    /// Exactly `count` palettes, or an error.
    async fn generate_palettes(&self, brief: &ConceptBrief, count: usize) -> AppResult<Vec<Palette>>;

    async fn recolor_image(&self, image: &Bytes, palette: &Palette) -> AppResult<Bytes>;
}
