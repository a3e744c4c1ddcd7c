//! Static template and ability-descriptor lookup.
//!
//! Templates are stored densely; the position of a template in the registry
//! is its *code index*, which keys the per-type pooling buckets in the agent
//! registry. Lookups fail fast for unknown codes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ability_data::{AbilityData, AbilityKind};
use super::agent_data::AgentTemplate;
use crate::error::{GameError, Result};

/// Serialized form of a data file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataFile {
    /// Active ability descriptors.
    #[serde(default)]
    pub abilities: Vec<AbilityData>,
    /// Agent templates.
    #[serde(default)]
    pub agents: Vec<AgentTemplate>,
}

/// Registry of agent templates and ability descriptors.
#[derive(Debug, Clone, Default)]
pub struct DataRegistry {
    templates: Vec<AgentTemplate>,
    by_code: HashMap<String, usize>,
    abilities: HashMap<AbilityKind, AbilityData>,
}

impl DataRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RON data file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid
    /// [`DataFile`].
    pub fn from_ron_str(source_name: &str, text: &str) -> Result<Self> {
        let file: DataFile = ron::from_str(text).map_err(|e| GameError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_data_file(file))
    }

    /// Build a registry from an already-parsed data file.
    #[must_use]
    pub fn from_data_file(file: DataFile) -> Self {
        let mut registry = Self::new();
        for ability in file.abilities {
            registry.register_ability(ability);
        }
        for template in file.agents {
            registry.register_agent(template);
        }
        registry
    }

    /// Export as a data file. Abilities come out in kind order.
    #[must_use]
    pub fn to_data_file(&self) -> DataFile {
        let mut abilities: Vec<AbilityData> = self.abilities.values().cloned().collect();
        abilities.sort_by_key(|data| data.kind);
        DataFile {
            abilities,
            agents: self.templates.clone(),
        }
    }

    /// Export as RON text that [`from_ron_str`](Self::from_ron_str) reads
    /// back to the same registry.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(&self.to_data_file(), ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Serialization(format!("Failed to write data RON: {e}")))
    }

    /// Register a template, replacing any previous template with the same
    /// code. Returns its code index.
    pub fn register_agent(&mut self, template: AgentTemplate) -> usize {
        if let Some(&index) = self.by_code.get(&template.code) {
            self.templates[index] = template;
            return index;
        }
        let index = self.templates.len();
        self.by_code.insert(template.code.clone(), index);
        self.templates.push(template);
        index
    }

    /// Register the descriptor for an active ability kind.
    pub fn register_ability(&mut self, data: AbilityData) {
        self.abilities.insert(data.kind, data);
    }

    /// Look up a template by code.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownAgentCode`] if no template has this code.
    pub fn agent_template(&self, code: &str) -> Result<&AgentTemplate> {
        self.agent_code_index(code).map(|index| &self.templates[index])
    }

    /// Look up the dense index of a code.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownAgentCode`] if no template has this code.
    pub fn agent_code_index(&self, code: &str) -> Result<usize> {
        self.by_code
            .get(code)
            .copied()
            .ok_or_else(|| GameError::UnknownAgentCode(code.to_string()))
    }

    /// Template at a code index.
    #[must_use]
    pub fn template_at(&self, index: usize) -> Option<&AgentTemplate> {
        self.templates.get(index)
    }

    /// Whether a template exists for this code.
    #[must_use]
    pub fn is_valid_agent_code(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Descriptor for an active ability kind.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnregisteredAbility`] when no descriptor was
    /// registered for `kind`.
    pub fn ability_data(&self, kind: AbilityKind) -> Result<&AbilityData> {
        self.abilities
            .get(&kind)
            .ok_or_else(|| GameError::UnregisteredAbility(kind.type_name().to_string()))
    }

    /// Descriptor listening on an input identifier.
    #[must_use]
    pub fn ability_by_input(&self, listen_input: u16) -> Option<&AbilityData> {
        // Lowest kind wins so the answer does not depend on map order.
        self.abilities
            .values()
            .filter(|data| data.listen_input == listen_input)
            .min_by_key(|data| data.kind)
    }

    /// All templates in code-index order.
    pub fn templates(&self) -> impl Iterator<Item = &AgentTemplate> {
        self.templates.iter()
    }

    /// Number of templates.
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Validate cross references. Returns a list of problems (empty if valid).
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        use super::ability_data::AbilityConfig;

        let mut errors = Vec::new();

        for template in &self.templates {
            for config in &template.abilities {
                let kind = config.kind();
                if kind.is_active() && !self.abilities.contains_key(&kind) {
                    errors.push(format!(
                        "Agent '{}' uses unregistered ability '{}'",
                        template.code,
                        kind.type_name()
                    ));
                }

                let (label, codes) = match config {
                    AbilityConfig::Construct(c) => ("builds", &c.build_actions),
                    AbilityConfig::Spawner(s) => ("spawns", &s.spawn_actions),
                    _ => continue,
                };
                for code in codes {
                    if !self.is_valid_agent_code(code) {
                        errors.push(format!(
                            "Agent '{}' {} unknown agent '{}'",
                            template.code, label, code
                        ));
                    }
                }
            }

            let mut kinds: Vec<_> = template.abilities.iter().map(AbilityConfig::kind).collect();
            kinds.sort();
            let before = kinds.len();
            kinds.dedup();
            if kinds.len() != before {
                errors.push(format!(
                    "Agent '{}' declares the same ability kind twice",
                    template.code
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ability_data::{MoveConfig, SpawnerConfig};

    const SAMPLE: &str = r#"(
        abilities: [
            (kind: Move, code: "Move", listen_input: 1),
            (kind: Spawner, code: "Spawner", listen_input: 4),
        ],
        agents: [
            (code: "worker", tag: Builder, abilities: [Move(())]),
            (code: "barracks", abilities: [Spawner((spawn_actions: ["worker"]))]),
        ],
    )"#;

    #[test]
    fn test_from_ron() {
        let registry = DataRegistry::from_ron_str("sample", SAMPLE).unwrap();
        assert_eq!(registry.template_count(), 2);
        assert_eq!(registry.agent_code_index("barracks").unwrap(), 1);
        assert_eq!(registry.ability_data(AbilityKind::Move).unwrap().listen_input, 1);
        assert!(registry.validate().is_empty(), "{:?}", registry.validate());
    }

    #[test]
    fn test_ron_export_reads_back() {
        let registry = DataRegistry::from_ron_str("sample", SAMPLE).unwrap();
        let text = registry.to_ron_string().unwrap();
        let again = DataRegistry::from_ron_str("export", &text).unwrap();
        assert_eq!(again.to_data_file().agents, registry.to_data_file().agents);
        assert_eq!(again.to_data_file().abilities, registry.to_data_file().abilities);
    }

    #[test]
    fn test_unknown_code_fails_fast() {
        let registry = DataRegistry::new();
        assert!(matches!(
            registry.agent_template("ghost"),
            Err(GameError::UnknownAgentCode(code)) if code == "ghost"
        ));
        assert!(matches!(
            registry.ability_data(AbilityKind::Attack),
            Err(GameError::UnregisteredAbility(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let result = DataRegistry::from_ron_str("broken", "(agents: [");
        assert!(matches!(result, Err(GameError::DataParseError { .. })));
    }

    #[test]
    fn test_reregister_keeps_index() {
        let mut registry = DataRegistry::new();
        let first = registry.register_agent(AgentTemplate::new("a"));
        registry.register_agent(AgentTemplate::new("b"));
        let again = registry.register_agent(AgentTemplate::new("a").with_priority(3));
        assert_eq!(first, again);
        assert_eq!(registry.agent_template("a").unwrap().priority, 3);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut registry = DataRegistry::new();
        registry.register_agent(
            AgentTemplate::new("factory")
                .with_ability(SpawnerConfig {
                    spawn_actions: vec!["tank".into()],
                    ..SpawnerConfig::default()
                })
                .with_ability(MoveConfig::default())
                .with_ability(MoveConfig::default()),
        );

        let errors = registry.validate();
        assert!(errors.iter().any(|e| e.contains("unknown agent 'tank'")));
        assert!(errors.iter().any(|e| e.contains("unregistered ability 'Spawner'")));
        assert!(errors.iter().any(|e| e.contains("same ability kind twice")));
    }
}
