//! Export and import of a whole treedb as `{topic: [records]}`.

use crate::error::ApiError;
use crate::schema::system::SNAPS_TOPIC;
use crate::treedb::{Treedb, WriteOptions};
use crate::types::option_set;
use crate::views::ViewOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

/// What import does with a record whose node already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfResourceExists {
    #[default]
    Abort,
    Skip,
    Overwrite,
}

impl FromStr for IfResourceExists {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ApiError::ValidationFailed(format!(
                "if-resource-exists must be abort, skip or overwrite, not '{}'",
                other
            ))),
        }
    }
}

/// Counters of one import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// 1 when the import stopped on an existing record
    /// under `IfResourceExists::Abort`
    pub abort: usize,
    pub added: usize,
    pub overwrite: usize,
    pub ignored: usize,
    pub failure: usize,
    pub link_failure: usize,
    /// Error message to occurrences
    pub errors: BTreeMap<String, usize>,
}

impl ImportReport {
    fn error(&mut self, err: &ApiError) {
        *self.errors.entry(err.to_string()).or_default() += 1;
    }
}

impl Treedb {
    /// Every node of every topic but `__snaps__`, main instances first then secondaries.
    pub fn export_db(&self, options: &Value) -> Result<Map<String, Value>, ApiError> {
        let view = ViewOptions {
            with_metadata: option_set(options, "with_metadata"),
            without_rowid: option_set(options, "without_rowid"),
            ..Default::default()
        };

        let mut db = Map::new();
        for topic in self.registry.topics() {
            if topic.topic_name == SNAPS_TOPIC {
                continue;
            }
            let index = self.topic_index(&topic.topic_name)?;
            let mut records = Vec::with_capacity(index.len());
            for node in index.primaries() {
                records.push(self.view(node, &view)?);
            }
            for node in index.instances(None).into_iter().filter(|n| !n.is_primary()) {
                records.push(self.view(node, &view)?);
            }
            db.insert(topic.topic_name.clone(), Value::Array(records));
        }
        Ok(db)
    }

    /// Load an exported document: create every record, then relink them all.
    pub fn import_db(
        &mut self,
        db: &Map<String, Value>,
        if_exists: IfResourceExists,
    ) -> Result<ImportReport, ApiError> {
        self.ensure_master()?;
        let mut report = ImportReport::default();
        let mut loaded: Vec<(&str, &Map<String, Value>)> = Vec::new();

        for (topic_name, records) in db {
            if topic_name == SNAPS_TOPIC {
                continue;
            }
            let Some(records) = records.as_array() else {
                report.failure += 1;
                report.error(&ApiError::ValidationFailed(format!(
                    "topic {} is not a list of records",
                    topic_name
                )));
                continue;
            };
            for record in records {
                let Some(kw) = record.as_object() else {
                    report.failure += 1;
                    continue;
                };
                match self.create_node(topic_name, kw) {
                    Ok(_) => {
                        report.added += 1;
                        loaded.push((topic_name, kw));
                    }
                    Err(err) if !matches!(err, ApiError::DuplicateKey { .. }) => {
                        warn!(topic_name = %topic_name, error = %err, "Import record rejected");
                        report.failure += 1;
                        report.error(&err);
                    }
                    Err(err) => match if_exists {
                        IfResourceExists::Abort => {
                            warn!(topic_name = %topic_name, error = %err, "Import aborted");
                            report.abort = 1;
                            report.error(&err);
                            return Ok(report);
                        }
                        IfResourceExists::Skip => {
                            report.ignored += 1;
                            report.error(&err);
                        }
                        IfResourceExists::Overwrite => {
                            match self.update_node(topic_name, kw, WriteOptions::default()) {
                                Ok(_) => {
                                    report.overwrite += 1;
                                    loaded.push((topic_name, kw));
                                }
                                Err(err) => {
                                    report.failure += 1;
                                    report.error(&err);
                                }
                            }
                        }
                    },
                }
            }
        }

        let relink = WriteOptions {
            autolink: true,
            ..Default::default()
        };
        for (topic_name, kw) in loaded {
            if let Err(err) = self.update_node(topic_name, kw, relink) {
                report.link_failure += 1;
                report.error(&err);
            }
        }

        info!(
            treedb_name = %self.name,
            added = report.added,
            overwrite = report.overwrite,
            ignored = report.ignored,
            failure = report.failure,
            link_failure = report.link_failure,
            "Import done"
        );
        Ok(report)
    }
}
