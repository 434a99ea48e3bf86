//! The resolution result - which candidate won for each identity.
//!
//! Once created, a result is read-only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::solver::adapter::Assignment;
use crate::solver::context::ResolutionContext;
use crate::solver::option::{LoadOption, ModLoadOption, OptionKind};

/// Serializable view of one selected mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedMod {
    pub id: String,
    pub version: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
}

/// The selected candidates of a successful solve.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResult {
    /// Mod id to the selected option
    selected: BTreeMap<String, ModLoadOption>,

    /// Provided alias to the option providing it
    providers: BTreeMap<String, ModLoadOption>,

    /// Selected helper options by kind, as descriptions
    side_tables: BTreeMap<OptionKind, Vec<String>>,
}

impl ResolutionResult {
    /// Read the selected options out of a satisfying assignment.
    pub fn from_assignment(context: &ResolutionContext, assignment: &Assignment) -> Self {
        let mut result = ResolutionResult::default();

        for id in assignment.selected() {
            let Some(option) = context.options().get(id) else {
                continue;
            };
            match option {
                LoadOption::Mod(m) => {
                    for provided in m.candidate().provided() {
                        if provided.id != m.id() {
                            result.providers.insert(provided.id.clone(), m.clone());
                        }
                    }
                    result.selected.insert(m.id().to_string(), m.clone());
                }
                LoadOption::Unless(_) => {
                    result
                        .side_tables
                        .entry(OptionKind::Unless)
                        .or_default()
                        .push(option.to_string());
                }
            }
        }

        result
    }

    /// The option selected for a mod id. Ids are not qualified by group.
    pub fn get(&self, id: &str) -> Option<&ModLoadOption> {
        self.selected.get(id)
    }

    /// The option providing an alias.
    pub fn provider_of(&self, alias: &str) -> Option<&ModLoadOption> {
        self.providers.get(alias)
    }

    /// Descriptions of selected options of a given kind outside the main mapping.
    pub fn side_table(&self, kind: OptionKind) -> &[String] {
        self.side_tables
            .get(&kind)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over selected mods in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModLoadOption)> {
        self.selected.iter().map(|(id, option)| (id.as_str(), option))
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Serializable listing of the selection.
    pub fn selections(&self) -> Vec<SelectedMod> {
        self.selected
            .values()
            .map(|option| {
                let candidate = option.candidate();
                SelectedMod {
                    id: candidate.id().to_string(),
                    version: candidate.version().to_string(),
                    origin: candidate.origin().to_string(),
                    provides: candidate
                        .provided()
                        .iter()
                        .map(|p| p.id.clone())
                        .collect(),
                }
            })
            .collect()
    }
}
