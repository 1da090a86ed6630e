use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ColorVariation, Concept, NewColorVariation, NewConcept, StoredConcept};
use crate::types::AppResult;

/// Persistence for concepts and the colour variations they own.
#[async_trait]
pub trait ConceptRepository: Send + Sync {
    /// Insert a concept and all of its variations atomically.
    async fn insert_with_variations(
        &self,
        concept: NewConcept,
        variations: Vec<NewColorVariation>,
    ) -> AppResult<StoredConcept>;

    async fn find_for_user(&self, concept_id: Uuid, user_id: Uuid)
        -> AppResult<Option<StoredConcept>>;

    async fn list_recent(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<StoredConcept>>;

    /// Delete a single concept with its variations. Returns false when it did not exist.
    async fn delete(&self, concept_id: Uuid) -> AppResult<bool>;

    /// Delete every concept of the user; variations go with them. Returns what
    /// was deleted so the caller can remove the stored images.
    async fn delete_all_for_user(&self, user_id: Uuid) -> AppResult<Vec<StoredConcept>>;
}

const CONCEPT_COLUMNS: &str = "id, user_id, logo_description, theme_description, image_path, \
     refined_from, refinement_prompt, created_at";
const VARIATION_COLUMNS: &str =
    "id, concept_id, position, palette_name, colors, description, image_path, created_at";

fn group_variations(
    concepts: Vec<Concept>,
    variations: Vec<ColorVariation>,
) -> Vec<StoredConcept> {
    let mut by_concept: HashMap<Uuid, Vec<ColorVariation>> = HashMap::new();
    for variation in variations {
        by_concept.entry(variation.concept_id).or_default().push(variation);
    }

    concepts
        .into_iter()
        .map(|concept| StoredConcept {
            variations: by_concept.remove(&concept.id).unwrap_or_default(),
            concept,
        })
        .collect()
}

pub struct PgConceptRepository {
    pool: PgPool,
}

impl PgConceptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_variations(&self, concepts: Vec<Concept>) -> AppResult<Vec<StoredConcept>> {
        if concepts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = concepts.iter().map(|c| c.id).collect();
        let variations = sqlx::query_as::<_, ColorVariation>(&format!(
            r#"
            SELECT {VARIATION_COLUMNS} FROM color_variations
            WHERE concept_id = ANY($1)
            ORDER BY position ASC
            "#
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(group_variations(concepts, variations))
    }
}

#[async_trait]
impl ConceptRepository for PgConceptRepository {
    async fn insert_with_variations(
        &self,
        concept: NewConcept,
        variations: Vec<NewColorVariation>,
    ) -> AppResult<StoredConcept> {
        let mut tx = self.pool.begin().await?;

        let concept = sqlx::query_as::<_, Concept>(&format!(
            r#"
            INSERT INTO concepts
                (id, user_id, logo_description, theme_description, image_path,
                 refined_from, refinement_prompt)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONCEPT_COLUMNS}
            "#
        ))
        .bind(concept.id)
        .bind(concept.user_id)
        .bind(&concept.logo_description)
        .bind(&concept.theme_description)
        .bind(&concept.image_path)
        .bind(concept.refined_from)
        .bind(&concept.refinement_prompt)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(variations.len());
        for variation in variations {
            let row = sqlx::query_as::<_, ColorVariation>(&format!(
                r#"
                INSERT INTO color_variations
                    (id, concept_id, position, palette_name, colors, description, image_path)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {VARIATION_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(concept.id)
            .bind(variation.position)
            .bind(&variation.palette_name)
            .bind(&variation.colors)
            .bind(&variation.description)
            .bind(&variation.image_path)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(row);
        }

        tx.commit().await?;

        Ok(StoredConcept {
            concept,
            variations: stored,
        })
    }

    async fn find_for_user(
        &self,
        concept_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<StoredConcept>> {
        let concept = sqlx::query_as::<_, Concept>(&format!(
            "SELECT {CONCEPT_COLUMNS} FROM concepts WHERE id = $1 AND user_id = $2"
        ))
        .bind(concept_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match concept {
            Some(concept) => Ok(self.attach_variations(vec![concept]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_recent(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<StoredConcept>> {
        let concepts = sqlx::query_as::<_, Concept>(&format!(
            r#"
            SELECT {CONCEPT_COLUMNS} FROM concepts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.attach_variations(concepts).await
    }

    async fn delete(&self, concept_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM concepts WHERE id = $1")
            .bind(concept_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> AppResult<Vec<StoredConcept>> {
        let mut tx = self.pool.begin().await?;

        // Variation rows disappear with the cascade, so read them first
        let variations = sqlx::query_as::<_, ColorVariation>(&format!(
            r#"
            SELECT {VARIATION_COLUMNS} FROM color_variations
            WHERE concept_id IN (SELECT id FROM concepts WHERE user_id = $1)
            ORDER BY position ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let concepts = sqlx::query_as::<_, Concept>(&format!(
            "DELETE FROM concepts WHERE user_id = $1 RETURNING {CONCEPT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(group_variations(concepts, variations))
    }
}
