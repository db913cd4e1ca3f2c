//! Filling in computed fields of whole documents.

use json_patch::PatchOperation;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::document;
use crate::error::Error;
use crate::schema::FormulaDescriptor;
use crate::sema;
use crate::{Engine, Evaluation, Formula};

fn overlaps(read: &[String], output: &[String]) -> bool {
    read.iter().zip(output.iter()).all(|(a, b)| a == b)
}

/// Order in which to evaluate formulas so that a formula reading another
/// one's output runs after it.
///
/// `outputs[i]` is the path formula `i` writes and `reads[i]` the document
/// paths it reads. Among formulas that are ready, the one listed first runs
/// first; a dependency cycle is broken the same way.
pub fn evaluation_order(outputs: &[&[String]], reads: &[Vec<Vec<String>>]) -> Vec<usize> {
    let n = outputs.len();
    let depends: Vec<Vec<usize>> = (0..n)
        .map(|b| {
            (0..n)
                .filter(|&a| {
                    a != b
                        && reads
                            .get(b)
                            .map_or(false, |rs| rs.iter().any(|r| overlaps(r, outputs[a])))
                })
                .collect()
        })
        .collect();

    let mut done = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let ready = (0..n).find(|&i| !done[i] && depends[i].iter().all(|&d| done[d]));
        let next = match ready {
            Some(i) => i,
            None => {
                let Some(i) = (0..n).find(|&i| !done[i]) else {
                    break;
                };
                warn!(formula = i, "formula dependency cycle, falling back to declaration order");
                i
            }
        };
        done[next] = true;
        order.push(next);
    }
    order
}

// Input of a formula whose field is still absent.
fn default_input(declared_type: Option<&str>) -> Json {
    match declared_type {
        Some("array") => Json::Array(Vec::new()),
        _ => Json::Null,
    }
}

impl Engine {
    /// Computes every formula of `schema` against `document` and writes the
    /// non-null results back into it.
    ///
    /// Formulas that fail to parse or surface an error leave their field
    /// untouched.
    pub fn evaluate_object<'d>(&self, schema: &Json, document: &'d mut Json) -> &'d mut Json {
        if document::is_empty(document) {
            return document;
        }

        let descriptors = self.formulas(schema);
        let compiled: Vec<(&FormulaDescriptor, Formula)> = descriptors
            .iter()
            .filter_map(|d| match Formula::compile(&d.formula) {
                Ok(f) => Some((d, f)),
                Err(err) => {
                    warn!(path = %d.dotted_path(), error = %err.msg, "formula does not parse");
                    None
                }
            })
            .collect();

        let outputs: Vec<&[String]> = compiled.iter().map(|(d, _)| d.output_path.as_slice()).collect();
        let reads: Vec<Vec<Vec<String>>> = compiled
            .iter()
            .map(|(_, f)| sema::document_reads(f.ast(), &self.config.document_key))
            .collect();

        for index in evaluation_order(&outputs, &reads) {
            let (descriptor, formula) = &compiled[index];
            let input = document::get(document, descriptor.output_path.as_slice())
                .cloned()
                .unwrap_or_else(|| default_input(descriptor.declared_type.as_deref()));

            match self.evaluate_formula(formula, document, &input) {
                Ok(Evaluation { value: Json::Null }) => {}
                Ok(Evaluation { value }) => {
                    if !document::set(document, descriptor.output_path.as_slice(), value) {
                        debug!(path = %descriptor.dotted_path(), "output path is past the end of an array");
                    }
                }
                Err(err) => {
                    warn!(path = %descriptor.dotted_path(), error = %err, "formula skipped")
                }
            }
        }

        document
    }

    /// Applies `operations` to a copy of `document`, recomputes formulas, and
    /// returns the patch taking `document` to that result.
    ///
    /// Operations that cannot be applied are skipped and appended unchanged
    /// to the returned patch.
    pub fn evaluate_patch(
        &self,
        schema: &Json,
        document: &Json,
        operations: &[PatchOperation],
    ) -> Vec<PatchOperation> {
        let mut patched = document.clone();
        let mut rejected = Vec::new();
        for operation in operations {
            if let Err(err) = apply(&mut patched, operation) {
                debug!(error = %err, "skipping patch operation");
                rejected.push(operation.clone());
            }
        }

        self.evaluate_object(schema, &mut patched);

        let mut corrected = json_patch::diff(document, &patched).0;
        corrected.extend(rejected);
        corrected
    }
}

fn apply(document: &mut Json, operation: &PatchOperation) -> Result<(), Error> {
    json_patch::patch(document, std::slice::from_ref(operation))
        .map_err(|err| Error::PatchApplication(err.to_string()))
}
