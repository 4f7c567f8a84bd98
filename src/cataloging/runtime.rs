// src/cataloging/runtime.rs

//! Cataloger runtime: concurrent execution and result merging
//!
//! Selected catalogers run on a bounded worker pool. The shared package
//! collection is the single cross-cataloger synchronization point; emitted
//! relationships and per-file failures merge under their own locks. Output
//! ordering during the run is not guaranteed; the final SBOM sorts.
//!
//! Cancellation is cooperative: each cataloger checks the token before
//! opening the next file, and a canceled run returns the partial result
//! tagged as canceled rather than discarding it.

use crate::artifact::{ArtifactId, Relationship, RelationshipNode};
use crate::bus;
use crate::cancel::CancelToken;
use crate::cataloging::config::{DataGenerationConfig, ExecutorConfig};
use crate::cataloging::select::CatalogerReference;
use crate::error::Error;
use crate::event::{Event, TaskDescription, TaskProgress, PACKAGE_CATALOGING_TASK};
use crate::linux::Release;
use crate::pkg::cataloger::ParseFailure;
use crate::pkg::{Collection, Cpe, CpeAttributes, CpeSource, Package};
use crate::source::Resolver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Everything produced by one runtime pass
pub struct RuntimeOutcome {
    pub packages: Collection,
    pub relationships: Vec<Relationship>,
    pub failures: Vec<ParseFailure>,
    pub canceled: bool,
}

/// Execute the selected catalogers against the resolver.
pub fn run_catalogers(
    selected: &[CatalogerReference],
    resolver: &dyn Resolver,
    release: Option<&Release>,
    executor: &ExecutorConfig,
    generation: &DataGenerationConfig,
    token: &CancelToken,
) -> RuntimeOutcome {
    let collection = Mutex::new(Collection::default());
    let relationships = Mutex::new(Vec::<Relationship>::new());
    let failures = Mutex::new(Vec::<ParseFailure>::new());
    let canceled = AtomicBool::new(false);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(executor.effective_parallelism())
        .build();

    let run_one = |reference: &CatalogerReference| {
        if token.is_canceled() {
            canceled.store(true, Ordering::Relaxed);
            return;
        }

        let progress = TaskProgress::new(0);
        bus::publish(Event::CatalogerTaskStarted {
            description: TaskDescription {
                id: reference.name().to_string(),
                parent_id: PACKAGE_CATALOGING_TASK.to_string(),
                title: reference.name().to_string(),
                context: String::new(),
            },
            progress: progress.clone(),
        });

        match reference
            .cataloger
            .catalog(resolver, release, token, &progress)
        {
            Ok(mut batch) => {
                // data generation can recompute package ids, so relationship
                // endpoints emitted by the cataloger are remapped to match
                let mut renamed: Vec<(ArtifactId, ArtifactId)> = Vec::new();
                {
                    let mut guard = collection.lock().expect("package collection poisoned");
                    for package in batch.packages {
                        let old_id = package.id().clone();
                        let package = generate_data(package, generation);
                        if *package.id() != old_id {
                            renamed.push((old_id, package.id().clone()));
                        }
                        guard.add(package);
                    }
                }
                if !batch.relationships.is_empty() {
                    for relationship in &mut batch.relationships {
                        for node in [&mut relationship.from, &mut relationship.to] {
                            let RelationshipNode::Package { id } = node else {
                                continue;
                            };
                            if let Some((_, new_id)) =
                                renamed.iter().find(|(old, _)| old == id)
                            {
                                *id = new_id.clone();
                            }
                        }
                    }
                    relationships
                        .lock()
                        .expect("relationship list poisoned")
                        .extend(batch.relationships);
                }
                if !batch.failures.is_empty() {
                    failures
                        .lock()
                        .expect("failure list poisoned")
                        .extend(batch.failures);
                }
                progress.set_completed();
            }
            Err(Error::Canceled) => {
                canceled.store(true, Ordering::Relaxed);
                progress.set_errored();
            }
            Err(e) => {
                debug!(cataloger = reference.name(), error = %e, "cataloger failed");
                failures
                    .lock()
                    .expect("failure list poisoned")
                    .push(ParseFailure {
                        cataloger: reference.name().to_string(),
                        path: String::new(),
                        reason: e.to_string(),
                    });
                progress.set_errored();
            }
        }
    };

    match pool {
        Ok(pool) => pool.install(|| {
            rayon::scope(|scope| {
                let run_one = &run_one;
                for reference in selected {
                    scope.spawn(move |_| run_one(reference));
                }
            })
        }),
        Err(e) => {
            // degraded mode: no pool, run serially on this thread
            warn!(error = %e, "worker pool unavailable, cataloging serially");
            for reference in selected {
                run_one(reference);
            }
        }
    }

    let failures = failures.into_inner().expect("failure list poisoned");
    summarize_failures(&failures);

    RuntimeOutcome {
        packages: collection.into_inner().expect("package collection poisoned"),
        relationships: relationships
            .into_inner()
            .expect("relationship list poisoned"),
        failures,
        canceled: canceled.load(Ordering::Relaxed) || token.is_canceled(),
    }
}

/// Fill in generated data (CPEs) before a package enters the collection.
fn generate_data(mut package: Package, generation: &DataGenerationConfig) -> Package {
    if generation.generate_cpes && package.cpes.is_empty() && !package.name.is_empty() {
        let product = package.name.rsplit('/').next().unwrap_or(&package.name);
        package.cpes.push(Cpe::new(
            CpeAttributes::application(product, product, &package.version),
            CpeSource::Generated,
        ));
        package.set_id();
    }
    package
}

fn summarize_failures(failures: &[ParseFailure]) {
    if failures.is_empty() {
        return;
    }
    warn!(count = failures.len(), "cataloging completed with parse failures");
    for failure in failures {
        debug!(
            cataloger = failure.cataloger.as_str(),
            path = failure.path.as_str(),
            reason = failure.reason.as_str(),
            "parse failure"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cataloging::select::{default_catalogers, select, SelectionRequest, INSTALLED_TAG};
    use crate::source::MemoryResolver;

    const STATUS: &str = "\
Package: bash
Status: install ok installed
Version: 5.2.15
Architecture: amd64
";

    fn installed_set() -> Vec<CatalogerReference> {
        let request = SelectionRequest::new().with_defaults(&[INSTALLED_TAG]);
        select(&default_catalogers(), &request)
    }

    #[test]
    fn test_runtime_merges_across_catalogers() {
        let resolver = MemoryResolver::new()
            .with_file("/var/lib/dpkg/status", STATUS.as_bytes())
            .with_file(
                "/usr/lib/python3/site-packages/pip-24.0.dist-info/METADATA",
                b"Name: pip\nVersion: 24.0\n",
            );

        let token = CancelToken::new();
        let outcome = run_catalogers(
            &installed_set(),
            &resolver,
            None,
            &ExecutorConfig::default(),
            &DataGenerationConfig::default(),
            &token,
        );

        assert!(!outcome.canceled);
        assert_eq!(outcome.packages.len(), 2);
        let names: Vec<String> = outcome
            .packages
            .sorted()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert!(names.contains(&"bash".to_string()));
        assert!(names.contains(&"pip".to_string()));
    }

    #[test]
    fn test_generated_cpes_present_by_default() {
        let resolver = MemoryResolver::new().with_file("/var/lib/dpkg/status", STATUS.as_bytes());

        let token = CancelToken::new();
        let outcome = run_catalogers(
            &installed_set(),
            &resolver,
            None,
            &ExecutorConfig::default(),
            &DataGenerationConfig::default(),
            &token,
        );

        let packages = outcome.packages.sorted();
        assert_eq!(packages[0].cpes.len(), 1);
        assert_eq!(
            packages[0].cpes[0].attributes.bind_to_fmt_string(),
            "cpe:2.3:a:bash:bash:5.2.15:*:*:*:*:*:*:*"
        );
    }

    #[test]
    fn test_relationship_endpoints_follow_generated_ids() {
        // bash depends on base-files; CPE generation recomputes both ids
        // after the cataloger emitted the dependency edge
        let status = "\
Package: bash
Status: install ok installed
Version: 5.2.15
Architecture: amd64
Depends: base-files

Package: base-files
Status: install ok installed
Version: 12.4
Architecture: amd64
";
        let resolver = MemoryResolver::new().with_file("/var/lib/dpkg/status", status.as_bytes());

        let token = CancelToken::new();
        let outcome = run_catalogers(
            &installed_set(),
            &resolver,
            None,
            &ExecutorConfig::default(),
            &DataGenerationConfig::default(),
            &token,
        );

        assert_eq!(outcome.relationships.len(), 1);
        for relationship in &outcome.relationships {
            for node in [&relationship.from, &relationship.to] {
                let id = node.package_id().expect("both endpoints are packages");
                assert!(
                    outcome.packages.contains(id),
                    "relationship endpoint {} missing from the collection",
                    id
                );
            }
        }
    }

    #[test]
    fn test_canceled_run_reports_partial() {
        let resolver = MemoryResolver::new().with_file("/var/lib/dpkg/status", STATUS.as_bytes());

        let token = CancelToken::new();
        token.cancel();
        let outcome = run_catalogers(
            &installed_set(),
            &resolver,
            None,
            &ExecutorConfig::default(),
            &DataGenerationConfig::default(),
            &token,
        );
        assert!(outcome.canceled);
    }

    #[test]
    fn test_parse_failures_do_not_abort() {
        let resolver = MemoryResolver::new()
            .with_file("/var/lib/dpkg/status", STATUS.as_bytes())
            // implausible rpm database content
            .with_file("/var/lib/rpm/rpmdb.sqlite", b"not a database at all");

        let token = CancelToken::new();
        let outcome = run_catalogers(
            &installed_set(),
            &resolver,
            None,
            &ExecutorConfig::default(),
            &DataGenerationConfig::default(),
            &token,
        );

        assert!(!outcome.canceled);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.packages.len() >= 1);
    }
}
