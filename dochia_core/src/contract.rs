use crate::error::DochiaError;
use crate::http::HttpMethod;
use crate::model::PlaybookData;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Reference data entries under this key apply to every path.
pub const ALL_PATHS_REF_DATA: &str = "all";

/// The compiled contract: every documented operation, grouped by contract path.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Contract {
    paths: BTreeMap<String, Vec<PlaybookData>>,
}

impl Contract {
    pub fn from_operations(paths: BTreeMap<String, Vec<PlaybookData>>) -> Result<Self, DochiaError> {
        let mut contract = Self { paths };
        contract.normalize()?;
        Ok(contract)
    }

    /// Parses an operations file. Every operation gets its contract path and
    /// the list of methods documented next to it.
    pub fn from_json(content: &str) -> Result<Self, DochiaError> {
        let paths: BTreeMap<String, Vec<PlaybookData>> = serde_json::from_str(content)
            .map_err(|e| DochiaError::InvalidContract(e.to_string()))?;
        Self::from_operations(paths)
    }

    fn normalize(&mut self) -> Result<(), DochiaError> {
        self.paths.retain(|path, operations| {
            if operations.is_empty() {
                debug!(path = %path, "Contract path has no operations, skipping");
            }
            !operations.is_empty()
        });
        if self.paths.is_empty() {
            return Err(DochiaError::InvalidContract("no operations found".to_string()));
        }

        for (contract_path, operations) in self.paths.iter_mut() {
            let methods: Vec<HttpMethod> = operations.iter().map(|d| d.method).collect();
            for data in operations.iter_mut() {
                if data.contract_path.is_empty() {
                    data.contract_path = contract_path.clone();
                }
                if data.path.is_empty() {
                    data.path = contract_path.clone();
                }
                data.path_methods = methods.clone();
            }
        }
        Ok(())
    }

    /// Contract paths in alphabetical order.
    pub fn contract_paths(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    pub fn operations(&self, contract_path: &str) -> &[PlaybookData] {
        self.paths.get(contract_path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.paths.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Adds configured reference data to the operations. Path entries win over
    /// the `all` entry; values already in the operations file win over both.
    pub fn merge_ref_data(&mut self, ref_data: &BTreeMap<String, BTreeMap<String, String>>) {
        let global = ref_data.get(ALL_PATHS_REF_DATA);
        for (contract_path, operations) in self.paths.iter_mut() {
            let specific = ref_data.get(contract_path);
            for data in operations.iter_mut() {
                for (field, value) in specific.into_iter().chain(global).flatten() {
                    data.ref_data
                        .entry(field.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }
}

/// Orders `paths` by their position in `order`; paths not listed follow,
/// alphabetically.
pub fn order_paths(paths: &[String], order: &[String]) -> Vec<String> {
    let mut ordered = paths.to_vec();
    ordered.sort_by(|a, b| {
        let position = |p: &String| order.iter().position(|o| o == p).unwrap_or(usize::MAX);
        position(a).cmp(&position(b)).then_with(|| a.cmp(b))
    });
    ordered
}

/// Reads a paths-order file: one contract path per line, blank lines and
/// `#` comments ignored.
pub fn parse_paths_order(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
