use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::db::ConceptRepository;
use crate::models::{
    ColorVariationResponse, ConceptResponse, DeleteConceptsResponse, StoredConcept,
};
use crate::storage::{Buckets, ObjectStore};
use crate::types::{AppError, AppResult};

/// Read side of concepts: lookups scoped to the owner, with signed image URLs.
#[derive(Clone)]
pub struct ConceptService {
    repo: Arc<dyn ConceptRepository>,
    store: Arc<dyn ObjectStore>,
    buckets: Buckets,
}

impl ConceptService {
    pub fn new(
        repo: Arc<dyn ConceptRepository>,
        store: Arc<dyn ObjectStore>,
        buckets: Buckets,
    ) -> Self {
        Self {
            repo,
            store,
            buckets,
        }
    }

    pub async fn find_owned(&self, concept_id: Uuid, user_id: Uuid) -> AppResult<StoredConcept> {
        self.repo
            .find_for_user(concept_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("concept {}", concept_id)))
    }

    pub async fn get_concept(&self, concept_id: Uuid, user_id: Uuid) -> AppResult<ConceptResponse> {
        let stored = self.find_owned(concept_id, user_id).await?;
        self.to_response(&stored).await
    }

    pub async fn list_recent(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<ConceptResponse>> {
        let stored = self.repo.list_recent(user_id, limit).await?;
        let mut responses = Vec::with_capacity(stored.len());
        for concept in &stored {
            responses.push(self.to_response(concept).await?);
        }
        Ok(responses)
    }

    /// Remove all of a user's concepts. Rows go first; image removal is best
    /// effort and only logged on failure.
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> AppResult<DeleteConceptsResponse> {
        let deleted = self.repo.delete_all_for_user(user_id).await?;

        let mut deleted_variations = 0;
        for stored in &deleted {
            self.delete_object(&self.buckets.concept, &stored.concept.image_path)
                .await;
            for variation in &stored.variations {
                self.delete_object(&self.buckets.palette, &variation.image_path)
                    .await;
                deleted_variations += 1;
            }
        }

        info!(%user_id, concepts = deleted.len(), variations = deleted_variations, "Deleted concepts");
        Ok(DeleteConceptsResponse {
            deleted_concepts: deleted.len(),
            deleted_variations,
        })
    }

    async fn delete_object(&self, bucket: &str, path: &str) {
        if let Err(e) = self.store.delete(bucket, path).await {
            warn!(bucket, path, error = %e, "Failed to delete stored image");
        }
    }

    pub async fn to_response(&self, stored: &StoredConcept) -> AppResult<ConceptResponse> {
        let expiry = self.buckets.signed_url_expiry_secs;
        let image_url = self
            .store
            .signed_url(&self.buckets.concept, &stored.concept.image_path, expiry)
            .await?;

        let mut color_variations = Vec::with_capacity(stored.variations.len());
        for variation in &stored.variations {
            let image_url = self
                .store
                .signed_url(&self.buckets.palette, &variation.image_path, expiry)
                .await?;
            color_variations.push(ColorVariationResponse {
                id: variation.id,
                palette_name: variation.palette_name.clone(),
                colors: variation.colors.clone(),
                description: variation.description.clone(),
                image_path: variation.image_path.clone(),
                image_url,
            });
        }

        let concept = &stored.concept;
        Ok(ConceptResponse {
            id: concept.id,
            logo_description: concept.logo_description.clone(),
            theme_description: concept.theme_description.clone(),
            image_path: concept.image_path.clone(),
            image_url,
            refined_from: concept.refined_from,
            refinement_prompt: concept.refinement_prompt.clone(),
            created_at: concept.created_at,
            color_variations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryConceptRepository;
    use crate::models::{NewColorVariation, NewConcept};
    use crate::storage::{concept_image_path, palette_image_path, MemoryObjectStore, PNG_CONTENT_TYPE};
    use bytes::Bytes;

    fn buckets() -> Buckets {
        Buckets {
            concept: "concept-images".to_string(),
            palette: "palette-images".to_string(),
            signed_url_expiry_secs: 60,
        }
    }

    async fn seed(
        repo: &MemoryConceptRepository,
        store: &MemoryObjectStore,
        user_id: Uuid,
        palettes: usize,
    ) -> StoredConcept {
        let id = Uuid::new_v4();
        let image_path = concept_image_path(user_id, id);
        store
            .upload("concept-images", &image_path, Bytes::from_static(b"base"), PNG_CONTENT_TYPE)
            .await
            .unwrap();

        let mut variations = Vec::new();
        for i in 0..palettes {
            let path = palette_image_path(user_id, id, i);
            store
                .upload("palette-images", &path, Bytes::from_static(b"variant"), PNG_CONTENT_TYPE)
                .await
                .unwrap();
            variations.push(NewColorVariation {
                position: i as i32,
                palette_name: format!("Palette {}", i + 1),
                colors: vec!["#112233".to_string()],
                description: None,
                image_path: path,
            });
        }

        repo.insert_with_variations(
            NewConcept {
                id,
                user_id,
                logo_description: "A minimalist fox logo".to_string(),
                theme_description: "Blue and gray corporate".to_string(),
                image_path,
                refined_from: None,
                refinement_prompt: None,
            },
            variations,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_concept_signs_every_image() {
        let repo = Arc::new(MemoryConceptRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let service = ConceptService::new(repo.clone(), store.clone(), buckets());
        let user = Uuid::new_v4();
        let stored = seed(&repo, &store, user, 3).await;

        let response = service.get_concept(stored.concept.id, user).await.unwrap();

        assert_eq!(response.color_variations.len(), 3);
        assert_eq!(
            store.fetch_signed(&response.image_url).await.unwrap(),
            Bytes::from_static(b"base")
        );
        for variation in &response.color_variations {
            assert_eq!(
                store.fetch_signed(&variation.image_url).await.unwrap(),
                Bytes::from_static(b"variant")
            );
        }
    }

    #[tokio::test]
    async fn test_get_concept_of_other_user_is_not_found() {
        let repo = Arc::new(MemoryConceptRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let service = ConceptService::new(repo.clone(), store.clone(), buckets());
        let stored = seed(&repo, &store, Uuid::new_v4(), 1).await;

        let result = service.get_concept(stored.concept.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_all_removes_rows_and_images() {
        let repo = Arc::new(MemoryConceptRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let service = ConceptService::new(repo.clone(), store.clone(), buckets());
        let user = Uuid::new_v4();
        seed(&repo, &store, user, 2).await;
        seed(&repo, &store, user, 3).await;
        let kept = seed(&repo, &store, Uuid::new_v4(), 1).await;

        let summary = service.delete_all_for_user(user).await.unwrap();

        assert_eq!(summary.deleted_concepts, 2);
        assert_eq!(summary.deleted_variations, 5);
        assert_eq!(repo.variation_count().await, 1);
        assert_eq!(store.object_count().await, 2);
        assert!(store.contains("concept-images", &kept.concept.image_path).await);
    }
}
