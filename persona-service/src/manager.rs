//! Person manager: enrichment and the validated entry points of the store.

use async_trait::async_trait;
use persona_core::{
    Identity, MetadataProvider, Person, PersonCreator, PersonFilter, PersonRepository,
    PersonaResult, PersonalMetaData, ResultExt, ValidationError,
};

/// Creates persons from identities and fronts the store for reads and
/// metadata edits.
///
/// Errors are wrapped with `PersonManager.<operation>` context.
pub struct PersonManager<R, M> {
    repo: R,
    metadata: M,
}

impl<R, M> PersonManager<R, M>
where
    R: PersonRepository,
    M: MetadataProvider,
{
    pub fn new(repo: R, metadata: M) -> Self {
        Self { repo, metadata }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Look up a person. `Ok(None)` when the id is unknown.
    pub async fn find_by_id(&self, id: &str) -> PersonaResult<Option<Person>> {
        const OP: &str = "PersonManager.FindById";
        if id.is_empty() {
            return Err(ValidationError::EmptyId).context(OP);
        }
        let person = self.repo.find_by_id(id).await.context(OP)?;
        Ok((!person.is_empty()).then_some(person))
    }

    pub async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>> {
        self.repo
            .collect(filter, limit, offset)
            .await
            .context("PersonManager.Collect")
    }

    pub async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
        const OP: &str = "PersonManager.Update";
        if id.is_empty() {
            return Err(ValidationError::EmptyId).context(OP);
        }
        if meta.is_empty() {
            return Err(ValidationError::NoUpdateData).context(OP);
        }
        self.repo.update(id, meta).await.context(OP)
    }

    pub async fn delete(&self, id: &str) -> PersonaResult<()> {
        const OP: &str = "PersonManager.Delete";
        if id.is_empty() {
            return Err(ValidationError::EmptyId).context(OP);
        }
        self.repo.delete(id).await.context(OP)
    }
}

#[async_trait]
impl<R, M> PersonCreator for PersonManager<R, M>
where
    R: PersonRepository,
    M: MetadataProvider,
{
    /// Enrich `identity` by first name, store it under a fresh id and
    /// return the id. Lookups run in order age, gender, nation and the first
    /// failure aborts the creation.
    async fn create_from(&self, identity: &Identity) -> PersonaResult<String> {
        const OP: &str = "PersonManager.CreateFrom";
        identity.validate().context(OP)?;

        let age = self.metadata.age_by_name(&identity.name).await.context(OP)?;
        let gender = self
            .metadata
            .gender_by_name(&identity.name)
            .await
            .context(OP)?;
        let nation = self
            .metadata
            .nation_by_name(&identity.name)
            .await
            .context(OP)?;

        let person = Person::new(identity.clone(), PersonalMetaData::new(nation, gender, age));
        self.repo.save(&person).await.context(OP)?;

        tracing::debug!(person_id = %person.id, age, "Person enriched and stored");
        Ok(person.id)
    }
}
