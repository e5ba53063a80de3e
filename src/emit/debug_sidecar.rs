//! Debug sidecar: emitted-line -> source-line + source-file mapping
//! (spec.md §4.4, §6's on-disk layout: "Debug sidecar per compiled
//! module: a JSON file mapping generated-line -> source-line + source-
//! file"). Written with `serde_json`, the same crate the teacher's own
//! `settings.rs`/`ember.toml` manifest handling already declares.

use crate::ast::FunctionDef;
use crate::string_interning::StringTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidecarEntry {
    pub emitted_line: u32,
    pub source_line: u32,
    pub source_file: String,
    pub function: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSidecar {
    pub entries: Vec<SidecarEntry>,
}

impl DebugSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_function(
        &mut self,
        def: &FunctionDef,
        line_map: &[(u32, u32)],
        string_table: &StringTable,
    ) {
        let name = string_table.resolve(def.name).to_string();
        for &(emitted_line, source_line) in line_map {
            self.entries.push(SidecarEntry {
                emitted_line,
                source_line,
                source_file: String::new(),
                function: name.clone(),
            });
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let mut sidecar = DebugSidecar::new();
        sidecar.entries.push(SidecarEntry {
            emitted_line: 3,
            source_line: 7,
            source_file: "fib.ember".into(),
            function: "fib".into(),
        });
        let json = sidecar.to_json().unwrap();
        let back = DebugSidecar::from_json(&json).unwrap();
        assert_eq!(sidecar.entries, back.entries);
    }
}
