//! In-process repositories with the same semantics as the Postgres ones,
//! including ownership scoping and the variation cascade. Used by the test
//! suites and for running the service without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{ConceptRepository, TaskRepository};
use crate::models::{
    ColorVariation, Concept, NewColorVariation, NewConcept, StoredConcept, Task, TaskStatus,
    TaskType, TaskUpdate,
};
use crate::types::{AppError, AppResult};

#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `updated_at`, e.g. to simulate a task that stopped making progress.
    pub async fn set_updated_at(&self, task_id: Uuid, at: DateTime<Utc>) {
        if let Some(task) = self.tasks.lock().await.get_mut(&task_id) {
            task.updated_at = at;
        }
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn insert(&self, task_type: TaskType, user_id: Uuid) -> AppResult<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            task_type,
            status: TaskStatus::Pending,
            user_id,
            created_at: now,
            updated_at: now,
            error_message: None,
            result_id: None,
        };
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find(&self, task_id: Uuid) -> AppResult<Option<Task>> {
        Ok(self.tasks.lock().await.get(&task_id).cloned())
    }

    async fn find_for_user(&self, task_id: Uuid, user_id: Uuid) -> AppResult<Option<Task>> {
        Ok(self
            .tasks
            .lock()
            .await
            .get(&task_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn update_status(&self, update: &TaskUpdate) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(&update.task_id) else {
            return Ok(None);
        };
        if task.status.is_terminal() {
            return Ok(None);
        }
        task.status = update.status;
        task.error_message = update.error_message.clone();
        if update.result_id.is_some() {
            task.result_id = update.result_id;
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn claim(&self, task_id: Uuid) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Processing;
                task.updated_at = Utc::now();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut owned: Vec<Task> = tasks.values().filter(|t| t.user_id == user_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(owned)
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64> {
        let mut tasks = self.tasks.lock().await;
        let mut failed = 0;
        for task in tasks.values_mut() {
            if task.status == TaskStatus::Processing && task.updated_at < cutoff {
                task.status = TaskStatus::Failed;
                task.error_message = Some(message.to_string());
                task.updated_at = Utc::now();
                failed += 1;
            }
        }
        Ok(failed)
    }
}

#[derive(Default)]
struct ConceptTables {
    concepts: Vec<Concept>,
    variations: Vec<ColorVariation>,
}

impl ConceptTables {
    fn stored(&self, concept: &Concept) -> StoredConcept {
        let mut variations: Vec<ColorVariation> = self
            .variations
            .iter()
            .filter(|v| v.concept_id == concept.id)
            .cloned()
            .collect();
        variations.sort_by_key(|v| v.position);
        StoredConcept {
            concept: concept.clone(),
            variations,
        }
    }
}

#[derive(Default)]
pub struct MemoryConceptRepository {
    tables: Mutex<ConceptTables>,
}

impl MemoryConceptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn concept_count(&self) -> usize {
        self.tables.lock().await.concepts.len()
    }

    pub async fn variation_count(&self) -> usize {
        self.tables.lock().await.variations.len()
    }
}

#[async_trait]
impl ConceptRepository for MemoryConceptRepository {
    async fn insert_with_variations(
        &self,
        concept: NewConcept,
        variations: Vec<NewColorVariation>,
    ) -> AppResult<StoredConcept> {
        let mut tables = self.tables.lock().await;
        if tables.concepts.iter().any(|c| c.id == concept.id) {
            return Err(AppError::Persistence(format!("concept {} already exists", concept.id)));
        }

        let now = Utc::now();
        let concept = Concept {
            id: concept.id,
            user_id: concept.user_id,
            logo_description: concept.logo_description,
            theme_description: concept.theme_description,
            image_path: concept.image_path,
            refined_from: concept.refined_from,
            refinement_prompt: concept.refinement_prompt,
            created_at: now,
        };
        let mut variations: Vec<ColorVariation> = variations
            .into_iter()
            .map(|v| ColorVariation {
                id: Uuid::new_v4(),
                concept_id: concept.id,
                position: v.position,
                palette_name: v.palette_name,
                colors: v.colors,
                description: v.description,
                image_path: v.image_path,
                created_at: now,
            })
            .collect();
        variations.sort_by_key(|v| v.position);

        tables.concepts.push(concept.clone());
        tables.variations.extend(variations.iter().cloned());

        Ok(StoredConcept {
            concept,
            variations,
        })
    }

    async fn find_for_user(
        &self,
        concept_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<StoredConcept>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .concepts
            .iter()
            .find(|c| c.id == concept_id && c.user_id == user_id)
            .map(|c| tables.stored(c)))
    }

    async fn list_recent(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<StoredConcept>> {
        let tables = self.tables.lock().await;
        let mut owned: Vec<&Concept> =
            tables.concepts.iter().filter(|c| c.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|c| tables.stored(c))
            .collect())
    }

    async fn delete(&self, concept_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.concepts.len();
        tables.concepts.retain(|c| c.id != concept_id);
        tables.variations.retain(|v| v.concept_id != concept_id);
        Ok(tables.concepts.len() < before)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> AppResult<Vec<StoredConcept>> {
        let mut tables = self.tables.lock().await;
        let deleted: Vec<StoredConcept> = tables
            .concepts
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| tables.stored(c))
            .collect();

        tables.concepts.retain(|c| c.user_id != user_id);
        let remaining: Vec<Uuid> = tables.concepts.iter().map(|c| c.id).collect();
        tables.variations.retain(|v| remaining.contains(&v.concept_id));

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_concept(user_id: Uuid) -> NewConcept {
        let id = Uuid::new_v4();
        NewConcept {
            id,
            user_id,
            logo_description: "A minimalist fox logo".to_string(),
            theme_description: "Blue and gray corporate".to_string(),
            image_path: format!("{}/{}/base.png", user_id, id),
            refined_from: None,
            refinement_prompt: None,
        }
    }

    fn variation(name: &str) -> NewColorVariation {
        positioned(0, name)
    }

    fn positioned(position: i32, name: &str) -> NewColorVariation {
        NewColorVariation {
            position,
            palette_name: name.to_string(),
            colors: vec!["#112233".to_string(), "#AABBCC".to_string()],
            description: None,
            image_path: format!("{}.png", name),
        }
    }

    #[tokio::test]
    async fn test_claim_is_single_shot() {
        let repo = MemoryTaskRepository::new();
        let task = repo.insert(TaskType::Generate, Uuid::new_v4()).await.unwrap();

        let claimed = repo.claim(task.id).await.unwrap();
        assert_eq!(claimed.map(|t| t.status), Some(TaskStatus::Processing));
        assert!(repo.claim(task.id).await.unwrap().is_none());
        assert!(repo.claim(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_for_user_hides_other_users_tasks() {
        let repo = MemoryTaskRepository::new();
        let owner = Uuid::new_v4();
        let task = repo.insert(TaskType::Refine, owner).await.unwrap();

        assert!(repo.find_for_user(task.id, owner).await.unwrap().is_some());
        assert!(repo.find_for_user(task.id, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_stale_only_touches_old_processing_tasks() {
        let repo = MemoryTaskRepository::new();
        let user = Uuid::new_v4();
        let stuck = repo.insert(TaskType::Generate, user).await.unwrap();
        let fresh = repo.insert(TaskType::Generate, user).await.unwrap();
        let pending = repo.insert(TaskType::Generate, user).await.unwrap();
        repo.claim(stuck.id).await.unwrap();
        repo.claim(fresh.id).await.unwrap();
        repo.set_updated_at(stuck.id, Utc::now() - Duration::hours(2)).await;

        let failed = repo
            .fail_stale(Utc::now() - Duration::minutes(15), "timed out")
            .await
            .unwrap();

        assert_eq!(failed, 1);
        let stuck = repo.find(stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, TaskStatus::Failed);
        assert_eq!(stuck.error_message.as_deref(), Some("timed out"));
        assert_eq!(repo.find(fresh.id).await.unwrap().unwrap().status, TaskStatus::Processing);
        assert_eq!(repo.find(pending.id).await.unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_all_cascades_variations() {
        let repo = MemoryConceptRepository::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        repo.insert_with_variations(new_concept(user), vec![variation("a"), variation("b")])
            .await
            .unwrap();
        repo.insert_with_variations(new_concept(user), vec![variation("c")])
            .await
            .unwrap();
        repo.insert_with_variations(new_concept(other), vec![variation("d")])
            .await
            .unwrap();

        let deleted = repo.delete_all_for_user(user).await.unwrap();

        assert_eq!(deleted.len(), 2);
        assert_eq!(deleted.iter().map(|c| c.variations.len()).sum::<usize>(), 3);
        assert_eq!(repo.concept_count().await, 1);
        assert_eq!(repo.variation_count().await, 1);
        assert!(repo.list_recent(user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_variations_keep_generation_order() {
        let repo = MemoryConceptRepository::new();
        let user = Uuid::new_v4();
        let concept = new_concept(user);
        let concept_id = concept.id;
        repo.insert_with_variations(
            concept,
            vec![positioned(2, "Autumn"), positioned(0, "Sunset"), positioned(1, "Deep Ocean")],
        )
        .await
        .unwrap();

        let stored = repo.find_for_user(concept_id, user).await.unwrap().unwrap();
        let names: Vec<&str> = stored.variations.iter().map(|v| v.palette_name.as_str()).collect();
        assert_eq!(names, vec!["Sunset", "Deep Ocean", "Autumn"]);
    }

    #[tokio::test]
    async fn test_delete_removes_one_concept() {
        let repo = MemoryConceptRepository::new();
        let user = Uuid::new_v4();
        let doomed = new_concept(user);
        let doomed_id = doomed.id;
        repo.insert_with_variations(doomed, vec![variation("a"), variation("b")])
            .await
            .unwrap();
        repo.insert_with_variations(new_concept(user), vec![variation("c")])
            .await
            .unwrap();

        assert!(repo.delete(doomed_id).await.unwrap());
        assert!(!repo.delete(doomed_id).await.unwrap());
        assert_eq!(repo.concept_count().await, 1);
        assert_eq!(repo.variation_count().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let repo = MemoryTaskRepository::new();
        let task = repo.insert(TaskType::Generate, Uuid::new_v4()).await.unwrap();
        repo.claim(task.id).await.unwrap();
        repo.set_updated_at(task.id, Utc::now() - Duration::hours(2)).await;
        repo.fail_stale(Utc::now() - Duration::minutes(15), "timed out")
            .await
            .unwrap();

        let update = TaskUpdate {
            task_id: task.id,
            status: TaskStatus::Completed,
            error_message: None,
            result_id: Some(Uuid::new_v4()),
        };
        assert!(repo.update_status(&update).await.unwrap().is_none());
        let task = repo.find(task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result_id.is_none());
    }
}
