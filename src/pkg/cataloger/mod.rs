// src/pkg/cataloger/mod.rs

//! Cataloger framework and the built-in cataloger fleet
//!
//! A cataloger claims files by glob or MIME type and parses each match into
//! packages and relationships. The [`Cataloger`] type is a name plus a list
//! of parse functions keyed by their claims; concrete catalogers are built
//! through [`Cataloger::new`] and the `with_parser_by_*` builders.
//!
//! Parse failures are non-fatal: they are collected per file and surfaced
//! as a summary, never aborting the run.

pub mod alpm;
pub mod binary;
pub mod dpkg;
pub mod golang;
pub mod java;
pub mod javascript;
pub mod kernel;
pub mod python;
pub mod rpm;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::event::TaskProgress;
use crate::file::Location;
use crate::linux::Release;
use crate::pkg::Package;
use crate::artifact::Relationship;
use crate::source::Resolver;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Everything a parse function may consult besides the file contents
pub struct ParseContext<'a> {
    pub location: &'a Location,
    pub resolver: &'a dyn Resolver,
    pub release: Option<&'a Release>,
    pub token: &'a CancelToken,
}

/// The output contract of a parse function
pub type ParseOutcome = Result<(Vec<Package>, Vec<Relationship>)>;

type ParserFn = Arc<dyn Fn(&mut (dyn Read + Send), &ParseContext) -> ParseOutcome + Send + Sync>;

enum Claim {
    Globs(Vec<String>),
    MimeTypes(Vec<String>),
}

/// A non-fatal parse failure recorded against its file
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub cataloger: String,
    pub path: String,
    pub reason: String,
}

/// The result of running one cataloger to completion
#[derive(Default, Debug)]
pub struct CatalogedBatch {
    pub packages: Vec<Package>,
    pub relationships: Vec<Relationship>,
    pub failures: Vec<ParseFailure>,
}

/// A named package cataloger: parse functions keyed by file claims
pub struct Cataloger {
    name: String,
    parsers: Vec<(Claim, ParserFn)>,
}

impl Cataloger {
    pub fn new(name: impl Into<String>) -> Self {
        Cataloger {
            name: name.into(),
            parsers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a parse function for files matching the given globs.
    pub fn with_parser_by_globs<F>(mut self, parser: F, globs: &[&str]) -> Self
    where
        F: Fn(&mut (dyn Read + Send), &ParseContext) -> ParseOutcome + Send + Sync + 'static,
    {
        self.parsers.push((
            Claim::Globs(globs.iter().map(|g| g.to_string()).collect()),
            Arc::new(parser),
        ));
        self
    }

    /// Register a parse function for files matching the given MIME types.
    pub fn with_parser_by_mime_types<F>(mut self, parser: F, types: &[&str]) -> Self
    where
        F: Fn(&mut (dyn Read + Send), &ParseContext) -> ParseOutcome + Send + Sync + 'static,
    {
        self.parsers.push((
            Claim::MimeTypes(types.iter().map(|t| t.to_string()).collect()),
            Arc::new(parser),
        ));
        self
    }

    /// Run every registered parser against its claimed files.
    ///
    /// Emitted package locations carry the primary-evidence annotation on
    /// the parsed file (set here when the parser did not claim otherwise).
    pub fn catalog(
        &self,
        resolver: &dyn Resolver,
        release: Option<&Release>,
        token: &CancelToken,
        progress: &TaskProgress,
    ) -> Result<CatalogedBatch> {
        let mut batch = CatalogedBatch::default();

        for (claim, parser) in &self.parsers {
            let matched = match claim {
                Claim::Globs(globs) => {
                    let patterns: Vec<&str> = globs.iter().map(String::as_str).collect();
                    resolver.files_by_glob(&patterns)?
                }
                Claim::MimeTypes(types) => {
                    let refs: Vec<&str> = types.iter().map(String::as_str).collect();
                    resolver.files_by_mime_type(&refs)?
                }
            };

            progress.set_total(progress.total().max(0) + matched.len() as i64);

            for location in matched {
                token.check()?;
                progress.set_stage(location.real_path());

                let mut reader = match resolver.file_contents_by_location(&location) {
                    Ok(reader) => reader,
                    Err(e) => {
                        batch.failures.push(ParseFailure {
                            cataloger: self.name.clone(),
                            path: location.real_path().to_string(),
                            reason: e.to_string(),
                        });
                        progress.increment(1);
                        continue;
                    }
                };

                let context = ParseContext {
                    location: &location,
                    resolver,
                    release,
                    token,
                };

                match parser(reader.as_mut(), &context) {
                    Ok((packages, relationships)) => {
                        for mut package in packages {
                            ensure_evidence(&mut package, &location);
                            package.set_id();
                            batch.packages.push(package);
                        }
                        batch.relationships.extend(relationships);
                    }
                    Err(Error::Canceled) => return Err(Error::Canceled),
                    Err(e) => {
                        debug!(
                            cataloger = self.name.as_str(),
                            path = location.real_path(),
                            error = %e,
                            "parse failed, continuing"
                        );
                        batch.failures.push(ParseFailure {
                            cataloger: self.name.clone(),
                            path: location.real_path().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
                progress.increment(1);
            }
        }

        Ok(batch)
    }
}

/// Guarantee the parsed file appears in the package's locations with an
/// evidence annotation; parsers that already annotated win.
fn ensure_evidence(package: &mut Package, parsed: &Location) {
    if package
        .locations
        .iter()
        .any(|l| l.annotations.contains_key(crate::file::EVIDENCE_ANNOTATION))
    {
        return;
    }
    package
        .locations
        .add(parsed.clone().with_primary_evidence());
}
