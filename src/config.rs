use crate::error::{HarvestError, Result};
use crate::flatten::FlattenConfig;
use crate::pipeline::SourcePipeline;
use crate::prefix::PrefixRules;
use crate::schema::{SchemaDefinition, SchemaRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Static description of one catalog source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Column holding the dataset identifier
    pub identifier: String,

    /// Store columns, in store order
    pub columns: Vec<String>,

    /// `[raw_prefix, canonical_prefix]` pairs
    pub prefix_rules: Vec<(String, String)>,

    /// Reject equally specific rules with different targets
    #[serde(default)]
    pub strict: bool,

    /// Default store location for this source
    #[serde(default)]
    pub store: Option<PathBuf>,
}

/// Configuration file: flattening settings plus every source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    #[serde(default)]
    pub flatten: FlattenConfig,

    pub sources: BTreeMap<String, SourceConfig>,
}

impl HarvestConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: HarvestConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|err| match err {
            HarvestError::Json(e) => {
                HarvestError::Configuration(format!("{}: {}", path.display(), e))
            }
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.flatten.separator.is_empty() {
            return Err(HarvestError::Configuration(
                "flatten.separator must not be empty".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(HarvestError::Configuration("no sources configured".to_string()));
        }
        for (name, source) in &self.sources {
            if source.prefix_rules.is_empty() {
                return Err(HarvestError::Configuration(format!(
                    "source '{}' has no prefix rules, every field would be dropped",
                    name
                )));
            }
            self.schema_for(name, source)?;
        }
        Ok(())
    }

    fn schema_for(&self, name: &str, source: &SourceConfig) -> Result<SchemaDefinition> {
        SchemaDefinition::new(name, source.identifier.clone(), source.columns.clone())
    }

    /// Schemas of every configured source
    pub fn registry(&self) -> Result<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        for (name, source) in &self.sources {
            registry.register(self.schema_for(name, source)?)?;
        }
        Ok(registry)
    }

    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| HarvestError::UnknownSource(name.to_string()))
    }

    /// Everything needed to project and merge one source's records
    pub fn pipeline(&self, name: &str) -> Result<SourcePipeline> {
        let source = self.source(name)?;
        let rules = PrefixRules::with_separator(
            source.prefix_rules.iter().cloned(),
            &self.flatten.separator,
        )
        .strict(source.strict);

        Ok(SourcePipeline {
            flatten: self.flatten.clone(),
            rules,
            schema: self.schema_for(name, source)?,
        })
    }
}
