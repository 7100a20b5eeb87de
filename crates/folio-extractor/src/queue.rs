//! Task queue builder

use crate::config::RunOptions;
use crate::error::{ExtractorError, Result};
use crate::persistence::PriorOutputs;
use folio_domain::{Document, TaskUnit, Template};
use std::collections::HashSet;
use tracing::{info, warn};

/// Expands a corpus and a template into ordered task units
///
/// Units come out grouped by document in corpus order, and within a document
/// in template order. The index range is applied first, then the retry
/// selection, then `force_stages` is unioned in.
pub struct QueueBuilder<'a> {
    template: &'a Template,
    options: &'a RunOptions,
}

impl<'a> QueueBuilder<'a> {
    /// Create a builder for one run
    pub fn new(template: &'a Template, options: &'a RunOptions) -> Self {
        Self { template, options }
    }

    /// Build the queue
    ///
    /// Invalid option combinations and unknown `force_stages` names are
    /// configuration errors. An empty range is not: it logs a warning and
    /// yields no units.
    pub fn build<P>(&self, documents: &[Document], prior: &P) -> Result<Vec<TaskUnit>>
    where
        P: PriorOutputs + ?Sized,
    {
        self.options.validate().map_err(ExtractorError::Config)?;
        self.template
            .check_module_names(&self.options.force_stages)?;

        let range = self.options.range(documents.len());
        if range.is_empty() {
            warn!(
                "Range start_idx={} end_idx={} selects no documents out of {}",
                self.options.start_idx,
                self.options.end_idx,
                documents.len()
            );
            return Ok(Vec::new());
        }

        let forced: HashSet<&str> = self
            .options
            .force_stages
            .iter()
            .map(String::as_str)
            .collect();

        let mut units = Vec::new();
        for index in range.clone() {
            let document = &documents[index];
            let targeted = self.retry_targets(document, prior);

            for module in &self.template.modules {
                let unit = TaskUnit::new(index, &document.hash, &module.name);
                let force = forced.contains(module.name.as_str());
                match &targeted {
                    None if force => units.push(unit.forced()),
                    None => units.push(unit),
                    Some(targets) if force || targets.contains(module.name.as_str()) => {
                        units.push(unit.forced())
                    }
                    Some(_) => {}
                }
            }
        }

        info!(
            "Scheduled {} units over {} documents ({} modules per document)",
            units.len(),
            range.len(),
            self.template.modules.len()
        );
        Ok(units)
    }

    /// Modules a retry mode selects for one document; `None` outside retry modes
    fn retry_targets<P>(&self, document: &Document, prior: &P) -> Option<HashSet<&'a str>>
    where
        P: PriorOutputs + ?Sized,
    {
        let modules = &self.template.modules;
        if self.options.retry_failed {
            let complete = modules
                .iter()
                .all(|m| prior.has_current(&document.hash, &m.name));
            let targets = if complete {
                HashSet::new()
            } else {
                modules.iter().map(|m| m.name.as_str()).collect()
            };
            return Some(targets);
        }

        if self.options.retry_failed_stages {
            let failed = prior.failed_modules(&document.hash, &document.source_path());
            let targets = modules
                .iter()
                .filter(|m| {
                    failed.contains(&m.name) || !prior.has_current(&document.hash, &m.name)
                })
                .map(|m| m.name.as_str())
                .collect();
            return Some(targets);
        }

        None
    }
}

/// Split a queue into per-document chains, keeping order
pub fn group_by_document(units: Vec<TaskUnit>) -> Vec<(usize, Vec<TaskUnit>)> {
    let mut groups: Vec<(usize, Vec<TaskUnit>)> = Vec::new();
    for unit in units {
        match groups.last_mut() {
            Some((index, chain)) if *index == unit.doc_index => chain.push(unit),
            _ => groups.push((unit.doc_index, vec![unit])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_domain::Module;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// Prior state keyed by (document hash, module)
    #[derive(Default)]
    struct Prior {
        current: HashSet<(String, String)>,
        failed: HashMap<String, Vec<String>>,
    }

    impl Prior {
        fn done(mut self, doc: &Document, modules: &[&str]) -> Self {
            for module in modules {
                self.current.insert((doc.hash.clone(), module.to_string()));
            }
            self
        }

        fn failed(mut self, doc: &Document, module: &str) -> Self {
            self.failed
                .entry(doc.hash.clone())
                .or_default()
                .push(module.to_string());
            self
        }
    }

    impl PriorOutputs for Prior {
        fn has_current(&self, source_hash: &str, module: &str) -> bool {
            self.current
                .contains(&(source_hash.to_string(), module.to_string()))
        }

        fn failed_modules(&self, source_hash: &str, _source_path: &str) -> Vec<String> {
            self.failed.get(source_hash).cloned().unwrap_or_default()
        }
    }

    fn template() -> Template {
        Template::new(
            "ab",
            vec![
                Module::new("A", "s", "u", json!({})),
                Module::new("B", "s", "u", json!({})),
            ],
        )
        .unwrap()
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("doc{}.md", i), format!("content {}", i)))
            .collect()
    }

    fn pairs(units: &[TaskUnit]) -> Vec<(usize, &str)> {
        units.iter().map(|u| (u.doc_index, u.module.as_str())).collect()
    }

    #[test]
    fn test_full_expansion_in_template_order() {
        let template = template();
        let options = RunOptions::default();
        let units = QueueBuilder::new(&template, &options)
            .build(&docs(2), &Prior::default())
            .unwrap();
        assert_eq!(pairs(&units), vec![(0, "A"), (0, "B"), (1, "A"), (1, "B")]);
        assert!(units.iter().all(|u| !u.forced));
    }

    #[test]
    fn test_single_module_template_one_unit_per_document() {
        let template = Template::new("one", vec![Module::new("m", "s", "u", json!({}))]).unwrap();
        let options = RunOptions::default();
        let units = QueueBuilder::new(&template, &options)
            .build(&docs(3), &Prior::default())
            .unwrap();
        assert_eq!(units.len(), 3);
    }

    #[test]
    fn test_retry_failed_stages_scenario() {
        let docs = docs(3);
        let prior = Prior::default()
            .done(&docs[0], &["A", "B"])
            .done(&docs[1], &["A", "B"])
            .done(&docs[2], &["A"])
            .failed(&docs[2], "B");
        let template = template();
        let options = RunOptions {
            retry_failed_stages: true,
            ..RunOptions::default()
        };

        let units = QueueBuilder::new(&template, &options)
            .build(&docs, &prior)
            .unwrap();
        assert_eq!(pairs(&units), vec![(2, "B")]);
        assert!(units[0].forced);
    }

    #[test]
    fn test_retry_failed_stages_includes_missing_outputs() {
        let docs = docs(2);
        let prior = Prior::default().done(&docs[0], &["A", "B"]).done(&docs[1], &["B"]);
        let template = template();
        let options = RunOptions {
            retry_failed_stages: true,
            ..RunOptions::default()
        };
        let units = QueueBuilder::new(&template, &options)
            .build(&docs, &prior)
            .unwrap();
        assert_eq!(pairs(&units), vec![(1, "A")]);
    }

    #[test]
    fn test_retry_failed_expands_incomplete_documents() {
        let docs = docs(2);
        let prior = Prior::default().done(&docs[0], &["A", "B"]).done(&docs[1], &["A"]);
        let template = template();
        let options = RunOptions {
            retry_failed: true,
            ..RunOptions::default()
        };
        let units = QueueBuilder::new(&template, &options)
            .build(&docs, &prior)
            .unwrap();
        assert_eq!(pairs(&units), vec![(1, "A"), (1, "B")]);
    }

    #[test]
    fn test_force_stage_unions_with_retry_selection() {
        let docs = docs(2);
        let prior = Prior::default().done(&docs[0], &["A", "B"]).done(&docs[1], &["A"]);
        let template = template();
        let options = RunOptions {
            retry_failed_stages: true,
            force_stages: vec!["A".to_string()],
            ..RunOptions::default()
        };
        let units = QueueBuilder::new(&template, &options)
            .build(&docs, &prior)
            .unwrap();
        assert_eq!(pairs(&units), vec![(0, "A"), (1, "A"), (1, "B")]);
        assert!(units.iter().all(|u| u.forced));
    }

    #[test]
    fn test_unknown_force_stage_rejected() {
        let template = template();
        let options = RunOptions {
            force_stages: vec!["C".to_string()],
            ..RunOptions::default()
        };
        let result = QueueBuilder::new(&template, &options).build(&docs(1), &Prior::default());
        assert!(matches!(result, Err(ExtractorError::Template(_))));
    }

    #[test]
    fn test_both_retry_modes_rejected() {
        let template = template();
        let options = RunOptions {
            retry_failed: true,
            retry_failed_stages: true,
            ..RunOptions::default()
        };
        let result = QueueBuilder::new(&template, &options).build(&docs(1), &Prior::default());
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[test]
    fn test_range_applies_before_retry_filter() {
        let docs = docs(4);
        let prior = Prior::default().failed(&docs[0], "A").done(&docs[2], &["A", "B"]);
        let template = template();
        let options = RunOptions {
            start_idx: 1,
            end_idx: 3,
            retry_failed_stages: true,
            ..RunOptions::default()
        };
        let units = QueueBuilder::new(&template, &options)
            .build(&docs, &prior)
            .unwrap();
        // doc 0 is out of range despite its failure; doc 2 is complete
        assert_eq!(pairs(&units), vec![(1, "A"), (1, "B")]);
    }

    #[test]
    fn test_empty_range_yields_no_units() {
        let template = template();
        let options = RunOptions {
            start_idx: 5,
            ..RunOptions::default()
        };
        let units = QueueBuilder::new(&template, &options)
            .build(&docs(3), &Prior::default())
            .unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_group_by_document() {
        let template = template();
        let options = RunOptions::default();
        let units = QueueBuilder::new(&template, &options)
            .build(&docs(3), &Prior::default())
            .unwrap();
        let groups = group_by_document(units);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].0, 1);
        assert_eq!(pairs(&groups[1].1), vec![(1, "A"), (1, "B")]);
    }

    proptest! {
        /// Property: units follow corpus order, then template order, over exactly the range
        #[test]
        fn test_queue_order_for_any_range(
            len in 0usize..8,
            start_idx in 0usize..10,
            end_idx in -1i64..10,
        ) {
            let template = template();
            let options = RunOptions {
                start_idx,
                end_idx,
                ..RunOptions::default()
            };
            let units = QueueBuilder::new(&template, &options)
                .build(&docs(len), &Prior::default())
                .unwrap();

            let expected: Vec<(usize, &str)> = options
                .range(len)
                .flat_map(|i| [(i, "A"), (i, "B")])
                .collect();
            prop_assert_eq!(pairs(&units), expected);
        }
    }
}
