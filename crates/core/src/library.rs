use chrono::Utc;
use tracing::info;

use crate::domain::line::LineItem;
use crate::domain::model::{ModelId, ModelLine, SavedModel};
use crate::errors::DomainError;

/// Named, reusable bundles of line items. Models are only ever added; nothing here removes
/// them.
#[derive(Clone, Debug, Default)]
pub struct ModelLibrary {
    models: Vec<SavedModel>,
}

impl ModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, name: &str, lines: &[LineItem]) -> Result<SavedModel, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("model name must not be empty".to_string()));
        }
        if lines.is_empty() {
            return Err(DomainError::Validation(format!(
                "model `{name}` must contain at least one line item"
            )));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::Validation(format!(
                "line `{}` must have quantity >= 1",
                line.sku
            )));
        }

        let model = SavedModel {
            id: ModelId::generate(),
            name: name.to_string(),
            lines: lines.iter().map(ModelLine::from).collect(),
            created_at: Utc::now(),
        };
        self.models.push(model.clone());

        info!(
            event_name = "library.model_saved",
            model_id = %model.id.0,
            line_count = model.lines.len(),
            "saved model stored"
        );
        Ok(model)
    }

    /// Fresh line items for the model, each with a newly generated id.
    pub fn load(&self, model_id: &ModelId) -> Result<Vec<LineItem>, DomainError> {
        let model = self.get(model_id)?;
        Ok(model.lines.iter().map(ModelLine::instantiate).collect())
    }

    pub fn get(&self, model_id: &ModelId) -> Result<&SavedModel, DomainError> {
        self.models
            .iter()
            .find(|model| &model.id == model_id)
            .ok_or_else(|| DomainError::not_found("saved model", model_id.0.clone()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SavedModel> {
        let name = name.trim();
        self.models.iter().find(|model| model.name.eq_ignore_ascii_case(name))
    }

    pub fn list(&self) -> &[SavedModel] {
        &self.models
    }
}
