//! Phase orchestration
//!
//! Drives a session through Analyze → Crawl → Verify → Rewrite → Package
//! under the session-wide timeout, emitting the event stream along the
//! way. Rewriting starts only after all fetches (initial and recursive)
//! have quiesced; an expired timeout cancels in-flight work by dropping
//! the phase future and transitions the session to `timeout`.

pub mod artifacts;
pub mod progress;

pub use progress::{LogProgress, NoOpProgress, ProgressReporter};

use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analyzer::{PayloadAnalyzer, PayloadReport};
use crate::assets::{Asset, AssetCounts, AssetTable, AssetType, DiscoveryMethod, DownloadStatus};
use crate::build_tool::{self, BuildToolFingerprint, PageObservations, PathStrategy};
use crate::cache::{CacheConfig, CacheStore};
use crate::config::CloneConfig;
use crate::discovery::RecursiveDiscovery;
use crate::error::{CloneError, CloneResult};
use crate::events::{AssetSummary, CloneEvent, EventBus};
use crate::fetch::{FetchPipeline, FetchPipelineConfig, HttpTransport};
use crate::hybrid::{HybridProcessor, ProcessContext};
use crate::rewriter::{page_filename_for_path, Rewriter};
use crate::session::{SessionManager, SessionStatus};
use crate::url_resolver::{extract_domain, UrlResolver};
use crate::utils::constants::DEFAULT_CACHE_TTL_SECS;
use crate::utils::fs::atomic_write;
use crate::verifier::{VerificationReport, Verifier};

/// Final outcome handed to the embedder
#[derive(Debug)]
pub struct CloneOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub pages: usize,
    pub assets: AssetCounts,
    pub verification: Option<VerificationReport>,
    pub output_dir: PathBuf,
}

/// One saved page awaiting the rewrite phase
struct SavedPage {
    url: String,
    filename: String,
}

/// Session orchestrator
pub struct Orchestrator {
    config: CloneConfig,
    sessions: SessionManager,
    events: Arc<EventBus>,
    cache: Option<Arc<CacheStore>>,
    retry: Arc<crate::retry::RetryManager>,
    progress: Box<dyn ProgressReporter>,
}

impl Orchestrator {
    /// Build an orchestrator for one configuration.
    ///
    /// The cache store and circuit-breaker map are process-wide in intent;
    /// embedders running multiple sessions should share one orchestrator's
    /// `retry` and `cache` by constructing sessions through the same
    /// instance sequentially, or clone the Arcs out.
    pub async fn new(config: CloneConfig) -> CloneResult<Self> {
        let sessions = SessionManager::open(config.output_root()).await?;

        let cache = if config.cache().enabled {
            let mut cache_config = CacheConfig::at_root(config.output_root());
            cache_config.max_size = config.cache().max_size;
            Some(Arc::new(CacheStore::open(cache_config).await?))
        } else {
            None
        };

        let retry = Arc::new(crate::retry::RetryManager::new(
            crate::retry::RetryPolicy::default(),
            Arc::new(crate::retry::CircuitBreaker::new(
                5,
                std::time::Duration::from_secs(60),
            )),
            Arc::new(crate::retry::RateLimiter::new(
                config.rate().rps,
                config.rate().max_concurrent,
            )),
        ));

        Ok(Self {
            config,
            sessions,
            events: Arc::new(EventBus::new()),
            cache,
            retry,
            progress: Box::new(NoOpProgress),
        })
    }

    /// Replace the progress reporter (default: no-op)
    #[must_use]
    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// The bus consumers subscribe to for the session event stream
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// The session manager (list/resume/delete surface)
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Publish `session_recovery_available` for every interrupted session
    /// that passes the recoverability rule. Call after subscribing.
    pub async fn announce_recoverable(&self) {
        for summary in self.sessions.recoverable_sessions().await {
            self.events.publish(CloneEvent::SessionRecoveryAvailable {
                session_id: summary.id,
                progress: summary.progress,
                asset_count: summary.asset_count,
            });
        }
    }

    /// Run a full session to completion or terminal failure.
    pub async fn run(&self) -> CloneResult<CloneOutcome> {
        let session = self.sessions.create(self.config.clone()).await?;
        let session_id = session.id.clone();
        let output_dir = session.output_dir.clone();
        info!(
            "Session {session_id}: mirroring {} into {}",
            self.config.start_url(),
            output_dir.display()
        );

        let total_timeout = self.config.total_timeout();
        match tokio::time::timeout(total_timeout, self.run_phases(&session_id, &output_dir)).await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => {
                let status = if matches!(err, CloneError::SessionTimeout) {
                    SessionStatus::Timeout
                } else {
                    SessionStatus::Error
                };
                warn!("Session {session_id} failed: {err}");
                self.progress.report_error(&err.to_string());
                let _ = self.sessions.update_status(&session_id, status).await;
                self.events.publish(CloneEvent::Error {
                    session_id: session_id.clone(),
                    kind: err.kind_tag().to_string(),
                    message: err.to_string(),
                });
                self.emit_status(&session_id, status, 0.0, AssetCounts::default());
                Err(err)
            }
            Err(_) => {
                // Dropping the phase future cancels in-flight fetches and
                // page work at their next suspension point.
                warn!("Session {session_id} hit the {total_timeout:?} session timeout");
                let _ = self
                    .sessions
                    .update_status(&session_id, SessionStatus::Timeout)
                    .await;
                self.emit_status(&session_id, SessionStatus::Timeout, 0.0, AssetCounts::default());
                Err(CloneError::SessionTimeout)
            }
        }
    }

    /// Resume an interrupted session from its last checkpoint.
    ///
    /// Accumulated assets, visited URLs and queued URLs are preserved; the
    /// analysis phase is not repeated (the expected set is the restored
    /// table). Emits `session_resumed` on success, `session_not_found` /
    /// `session_resume_failed` otherwise.
    pub async fn resume(&self, session_id: &str) -> CloneResult<CloneOutcome> {
        let state = match self.sessions.resume(session_id).await {
            Ok(state) => state,
            Err(CloneError::SessionNotFound(id)) => {
                self.events.publish(CloneEvent::SessionNotFound {
                    session_id: id.clone(),
                });
                return Err(CloneError::SessionNotFound(id));
            }
            Err(err) => {
                self.events.publish(CloneEvent::SessionResumeFailed {
                    session_id: session_id.to_string(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };
        self.events.publish(CloneEvent::SessionResumed {
            session_id: session_id.to_string(),
        });

        let output_dir = state.output_dir.clone();
        let total_timeout = self.config.total_timeout();
        match tokio::time::timeout(total_timeout, self.resume_phases(&state, &output_dir)).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self
                    .sessions
                    .update_status(session_id, SessionStatus::Timeout)
                    .await;
                Err(CloneError::SessionTimeout)
            }
        }
    }

    async fn resume_phases(
        &self,
        state: &crate::session::SessionState,
        output_dir: &Path,
    ) -> CloneResult<CloneOutcome> {
        let session_id = &state.id;
        let resolver = Arc::new(UrlResolver::new());
        let table = Arc::new(AssetTable::from_assets(state.assets.clone()));
        let transport = HttpTransport::new()?;
        let pipeline = Arc::new(FetchPipeline::new(
            transport.clone(),
            self.cache.clone(),
            Arc::clone(&self.retry),
            Arc::clone(&table),
            FetchPipelineConfig {
                output_root: output_dir.to_path_buf(),
                max_file_size: self.config.max_file_size(),
                cache_ttl_secs: Some(DEFAULT_CACHE_TTL_SECS),
            },
        ));

        let browser = match crate::browser::launch_browser(self.config.browser()).await {
            Ok(launched) => Some(launched),
            Err(e) => {
                warn!("Browser unavailable on resume, static-only: {e:#}");
                None
            }
        };

        // Expected set for verification is everything already tracked.
        let report = self.empty_report();
        let queue: VecDeque<(String, u32)> = state
            .queued_urls
            .iter()
            .map(|url| (url.clone(), self.config.max_depth()))
            .collect();
        let visited: HashSet<String> = state.visited_urls.iter().cloned().collect();

        let (pages, fingerprint) = self
            .crawl(
                session_id,
                output_dir,
                &table,
                &resolver,
                &transport,
                browser.as_ref().map(|(b, _, _)| b),
                &report,
                queue,
                visited,
            )
            .await?;

        let strategy = PathStrategy::for_fingerprint(&fingerprint);
        pipeline.set_strategy(strategy);

        self.fetch_pending(session_id, &table, &pipeline).await;
        let discovery = RecursiveDiscovery::new(Arc::clone(&table), Arc::clone(&resolver));
        discovery.run(&pipeline, output_dir).await;

        if let Some((mut b, handler, _dir)) = browser {
            let _ = b.close().await;
            handler.abort();
        }

        self.transition(session_id, SessionStatus::Verifying).await?;
        let expected: Vec<String> = table.snapshot().into_iter().map(|a| a.url).collect();
        let verifier = Verifier::new(Arc::clone(&table), output_dir);
        let verification = verifier.verify(&expected, &pipeline).await;
        self.events
            .publish(CloneEvent::CompletenessVerificationComplete {
                session_id: session_id.to_string(),
                completeness_percent: verification.completeness_percent,
                quality_score: verification.quality_score,
                missing: verification.missing.len(),
                failed: verification.failed.len(),
                recovered: verification.recovered.len(),
            });

        self.transition(session_id, SessionStatus::Processing).await?;
        self.rewrite_outputs(output_dir, &table, &resolver, &pages).await;
        artifacts::write_asset_manifest(&table, output_dir).await?;
        artifacts::write_build_tool_info(&fingerprint, output_dir).await?;
        artifacts::write_service_worker(&table, output_dir).await?;

        let counts = table.counts();
        let final_snapshot = table.snapshot();
        self.sessions
            .update(session_id, |s| {
                s.assets = final_snapshot;
                s.stats.assets_downloaded = counts.downloaded;
                s.stats.assets_failed = counts.failed;
            })
            .await?;
        self.transition(session_id, SessionStatus::Completed).await?;
        self.emit_status(session_id, SessionStatus::Completed, 100.0, counts.clone());

        Ok(CloneOutcome {
            session_id: session_id.to_string(),
            status: SessionStatus::Completed,
            pages: pages.len(),
            assets: counts,
            verification: Some(verification),
            output_dir: output_dir.to_path_buf(),
        })
    }

    async fn run_phases(&self, session_id: &str, output_dir: &Path) -> CloneResult<CloneOutcome> {
        let mut phase_clock = std::time::Instant::now();
        let mut phase_durations: Vec<(String, u64)> = Vec::new();
        let mut lap = move |name: &str| {
            let elapsed = phase_clock.elapsed().as_millis() as u64;
            phase_clock = std::time::Instant::now();
            (name.to_string(), elapsed)
        };

        let resolver = Arc::new(UrlResolver::new());
        let table = Arc::new(AssetTable::new());
        let transport = HttpTransport::new()?;
        let pipeline = Arc::new(FetchPipeline::new(
            transport.clone(),
            self.cache.clone(),
            Arc::clone(&self.retry),
            Arc::clone(&table),
            FetchPipelineConfig {
                output_root: output_dir.to_path_buf(),
                max_file_size: self.config.max_file_size(),
                cache_ttl_secs: Some(DEFAULT_CACHE_TTL_SECS),
            },
        ));

        // ---- Phase: Analyze ----------------------------------------------
        self.transition(session_id, SessionStatus::Analyzing).await?;
        self.progress.report_analyzing();
        self.emit_status(session_id, SessionStatus::Analyzing, 2.0, table.counts());

        let browser = match crate::browser::launch_browser(self.config.browser()).await {
            Ok(launched) => Some(launched),
            Err(e) => {
                warn!("Browser unavailable, degrading to static-only mirroring: {e:#}");
                None
            }
        };

        let report = match &browser {
            Some((browser, _, _)) => {
                let analyzer = PayloadAnalyzer::new(
                    transport.clone(),
                    Arc::clone(&resolver),
                    self.config.analysis_depth(),
                );
                match browser.new_page("about:blank").await {
                    Ok(page) => {
                        let result = analyzer
                            .analyze(&page, self.config.start_url(), self.config.page_timeout())
                            .await;
                        let _ = page.close().await;
                        match result {
                            Ok(report) => report,
                            Err(e) => {
                                warn!("Payload analysis failed, continuing without: {e}");
                                self.empty_report()
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Could not open analysis page: {e}");
                        self.empty_report()
                    }
                }
            }
            None => self.empty_report(),
        };

        self.events.publish(CloneEvent::PayloadAnalysisComplete {
            session_id: session_id.to_string(),
            total_assets: report.asset_count(),
            total_bytes: report.total_bytes,
            completeness_score: report.completeness_score,
            critical_count: report.critical_count,
            estimated_seconds: report.estimated_seconds,
        });

        // Seed the table with the expected set.
        for expected in &report.assets {
            if !self.config.type_allowed(expected.asset_type) {
                continue;
            }
            let mut asset = Asset::new(
                expected.url.clone(),
                expected.url.clone(),
                expected.asset_type,
                DiscoveryMethod::DomScan,
            );
            asset.critical = expected.critical;
            asset.expected_size = Some(expected.expected_size);
            if table.insert(asset) {
                self.emit_asset_found(session_id, &expected.url, &table);
            }
        }

        phase_durations.push(lap("analyze"));

        // ---- Phase: Crawl ------------------------------------------------
        self.transition(session_id, SessionStatus::Crawling).await?;
        self.progress.report_crawling();
        let start_url = resolver.resolve(self.config.start_url(), None, self.config.start_url());
        let mut queue = VecDeque::new();
        queue.push_back((start_url, 0));
        let (pages, fingerprint) = self
            .crawl(
                session_id,
                output_dir,
                &table,
                &resolver,
                &transport,
                browser.as_ref().map(|(b, _, _)| b),
                &report,
                queue,
                HashSet::new(),
            )
            .await?;

        let strategy = PathStrategy::for_fingerprint(&fingerprint);
        pipeline.set_strategy(strategy);
        info!(
            "Detected build tool {} (confidence {:.2}), strategy {strategy:?}",
            fingerprint.tool, fingerprint.confidence
        );

        // Fetch everything discovered so far.
        self.fetch_pending(session_id, &table, &pipeline).await;

        // Recursive discovery feeds newly visible assets back into fetch.
        let discovery = RecursiveDiscovery::new(Arc::clone(&table), Arc::clone(&resolver));
        let discovery_report = discovery.run(&pipeline, output_dir).await;
        if discovery_report.new_assets > 0 {
            info!(
                "Recursive discovery added {} assets over {} passes",
                discovery_report.new_assets, discovery_report.passes
            );
        }

        // Browser is no longer needed once fetches have quiesced.
        if let Some((mut b, handler, _dir)) = browser {
            let _ = b.close().await;
            handler.abort();
        }

        // Persist the crawl outcome into the session before verification.
        let snapshot = table.snapshot();
        self.sessions
            .update(session_id, |state| {
                state.assets = snapshot;
                state.stats.pages_crawled = pages.len();
                state.stats.assets_discovered = state.assets.len();
            })
            .await?;

        phase_durations.push(lap("crawl"));

        // ---- Phase: Verify -----------------------------------------------
        self.transition(session_id, SessionStatus::Verifying).await?;
        self.progress.report_verifying();
        self.emit_status(session_id, SessionStatus::Verifying, 65.0, table.counts());

        let verifier = Verifier::new(Arc::clone(&table), output_dir);
        let verification = verifier.verify(&report.expected_urls(), &pipeline).await;
        self.events
            .publish(CloneEvent::CompletenessVerificationComplete {
                session_id: session_id.to_string(),
                completeness_percent: verification.completeness_percent,
                quality_score: verification.quality_score,
                missing: verification.missing.len(),
                failed: verification.failed.len(),
                recovered: verification.recovered.len(),
            });

        phase_durations.push(lap("verify"));

        // ---- Phase: Rewrite + Package ------------------------------------
        self.transition(session_id, SessionStatus::Processing).await?;
        self.progress.report_processing();
        self.emit_status(session_id, SessionStatus::Processing, 80.0, table.counts());

        self.rewrite_outputs(output_dir, &table, &resolver, &pages).await;

        artifacts::write_asset_manifest(&table, output_dir).await?;
        artifacts::write_build_tool_info(&fingerprint, output_dir).await?;
        artifacts::write_service_worker(&table, output_dir).await?;
        let aliases = artifacts::create_path_aliases(strategy, output_dir).await;
        if aliases > 0 {
            self.events.publish(CloneEvent::SymlinksCreated {
                session_id: session_id.to_string(),
                count: aliases,
            });
        }

        phase_durations.push(lap("process"));

        // ---- Done --------------------------------------------------------
        let counts = table.counts();
        let final_snapshot = table.snapshot();
        self.sessions
            .update(session_id, |state| {
                state.assets = final_snapshot;
                state.stats.assets_downloaded = counts.downloaded;
                state.stats.assets_failed = counts.failed;
                state.stats.phase_durations_ms = phase_durations.into_iter().collect();
            })
            .await?;
        self.transition(session_id, SessionStatus::Completed).await?;
        self.emit_status(session_id, SessionStatus::Completed, 100.0, counts.clone());
        self.progress.report_completed();

        Ok(CloneOutcome {
            session_id: session_id.to_string(),
            status: SessionStatus::Completed,
            pages: pages.len(),
            assets: counts,
            verification: Some(verification),
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Breadth-first page crawl bounded by depth and origin policy.
    #[allow(clippy::too_many_arguments)]
    async fn crawl(
        &self,
        session_id: &str,
        output_dir: &Path,
        table: &Arc<AssetTable>,
        resolver: &Arc<UrlResolver>,
        transport: &HttpTransport,
        browser: Option<&chromiumoxide::Browser>,
        report: &PayloadReport,
        mut queue: VecDeque<(String, u32)>,
        mut visited: HashSet<String>,
    ) -> CloneResult<(Vec<SavedPage>, BuildToolFingerprint)> {
        let start_url = resolver.resolve(self.config.start_url(), None, self.config.start_url());
        let start_domain = extract_domain(&start_url).map_err(CloneError::UrlMalformed)?;

        let processor = HybridProcessor::new(Arc::clone(resolver));
        let ctx = ProcessContext {
            estimated_assets: Some(report.asset_count().max(1)),
            parse_timeout: self.config.page_timeout(),
            ..Default::default()
        };

        let mut pages: Vec<SavedPage> = Vec::new();
        let mut fingerprint = BuildToolFingerprint::unknown();

        while let Some((url, depth)) = queue.pop_front() {
            if !visited.insert(url.clone()) {
                continue;
            }

            debug!("Crawling [depth {depth}]: {url}");
            let (html, page) = match self.load_page(&url, transport, browser).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Failed to load page {url}: {e}");
                    self.sessions
                        .update(session_id, |s| s.error_log.push(format!("{url}: {e}")))
                        .await
                        .ok();
                    continue;
                }
            };

            // Build-tool observation; a stronger signal later overrides.
            let observations = PageObservations::from_html(&html);
            fingerprint = build_tool::merge(fingerprint, build_tool::detect(&observations));

            let result = processor.process(&url, &html, page.as_ref(), &ctx).await;
            for error in &result.errors {
                debug!("Processing error on {url}: {error}");
            }

            for asset in result.assets {
                if !self.config.type_allowed(asset.asset_type) {
                    continue;
                }
                let asset_url = asset.url.clone();
                if table.insert(asset) {
                    self.emit_asset_found(session_id, &asset_url, table);
                }
            }

            // Save the page markup; rewriting happens after fetch quiescence.
            let filename = self.page_filename(&url, &start_url);
            atomic_write(&output_dir.join(&filename), html.into_bytes())
                .await
                .map_err(|e| CloneError::Io(e.to_string()))?;
            pages.push(SavedPage {
                url: url.clone(),
                filename,
            });

            // Queue next-depth links under the origin policy.
            if depth < self.config.max_depth() {
                for link in result.links {
                    if visited.contains(&link) {
                        continue;
                    }
                    let same_origin = extract_domain(&link)
                        .map(|d| d == start_domain)
                        .unwrap_or(false);
                    if same_origin || self.config.follow_external_links() {
                        queue.push_back((link, depth + 1));
                    }
                }
            }

            if let Some(page) = page {
                let _ = page.close().await;
            }

            let progress = 10.0 + 30.0 * (pages.len() as f32 / (pages.len() + queue.len()).max(1) as f32);
            self.progress.report_page_done(&url);
            self.sessions.note_progress(session_id, 1, progress).await.ok();
            self.events.publish(CloneEvent::ProgressUpdate {
                session_id: session_id.to_string(),
                progress,
                current_url: Some(url),
            });
        }

        let queued: Vec<String> = queue.into_iter().map(|(u, _)| u).collect();
        let visited_list: Vec<String> = visited.into_iter().collect();
        self.sessions
            .update(session_id, |s| {
                s.visited_urls = visited_list;
                s.queued_urls = queued;
            })
            .await?;

        Ok((pages, fingerprint))
    }

    /// Load a page's rendered markup, preferring the browser.
    async fn load_page(
        &self,
        url: &str,
        transport: &HttpTransport,
        browser: Option<&chromiumoxide::Browser>,
    ) -> CloneResult<(String, Option<chromiumoxide::Page>)> {
        if let Some(browser) = browser {
            match browser.new_page("about:blank").await {
                Ok(page) => {
                    match crate::browser::navigate_idle(&page, url, self.config.page_timeout())
                        .await
                    {
                        Ok(()) => match page.content().await {
                            Ok(html) => return Ok((html, Some(page))),
                            Err(e) => {
                                warn!("content() failed for {url}, transport fallback: {e}");
                                let _ = page.close().await;
                            }
                        },
                        Err(e) => {
                            warn!("Navigation failed for {url}, transport fallback: {e:#}");
                            let _ = page.close().await;
                        }
                    }
                }
                Err(e) => warn!("new_page failed for {url}: {e}"),
            }
        }

        let response = transport
            .fetch(url, &std::collections::HashMap::new(), self.config.page_timeout())
            .await?;
        if !(200..300).contains(&response.status) {
            return Err(CloneError::HttpStatus(response.status));
        }
        Ok((String::from_utf8_lossy(&response.bytes).into_owned(), None))
    }

    /// Drain pending assets through the pipeline with bounded concurrency.
    async fn fetch_pending(
        &self,
        session_id: &str,
        table: &Arc<AssetTable>,
        pipeline: &Arc<FetchPipeline>,
    ) {
        let mut pending = table.pending_urls();
        if let Some(max_files) = self.config.max_files() {
            let already = table.counts().downloaded;
            let budget = max_files.saturating_sub(already);
            if pending.len() > budget {
                info!(
                    "File budget {max_files} truncates fetch set from {} to {budget}",
                    pending.len()
                );
                pending.truncate(budget);
            }
        }

        let concurrency = self.config.rate().max_concurrent.max(1);
        let total = pending.len();
        let mut completed = 0usize;

        let mut stream = futures::stream::iter(pending.into_iter().map(|url| {
            let pipeline = Arc::clone(pipeline);
            async move {
                let outcome = pipeline.fetch(&url).await;
                (url, outcome)
            }
        }))
        .buffer_unordered(concurrency);

        while let Some((url, outcome)) = stream.next().await {
            completed += 1;
            match outcome {
                Ok(asset) if asset.status == DownloadStatus::Downloaded => {
                    debug!("Fetched {url}");
                }
                Ok(_) => {}
                Err(e) => debug!("Fetch failed for {url}: {e}"),
            }

            if completed % 10 == 0 || completed == total {
                self.progress.report_fetching(completed, total);
                let progress = 40.0 + 20.0 * (completed as f32 / total.max(1) as f32);
                self.sessions
                    .note_progress(session_id, 1, progress)
                    .await
                    .ok();
                self.events.publish(CloneEvent::ProgressUpdate {
                    session_id: session_id.to_string(),
                    progress,
                    current_url: None,
                });
            }
        }
    }

    /// Rewrite saved pages and downloaded stylesheets in place.
    async fn rewrite_outputs(
        &self,
        output_dir: &Path,
        table: &Arc<AssetTable>,
        resolver: &Arc<UrlResolver>,
        pages: &[SavedPage],
    ) {
        let mut rewriter = Rewriter::new(Arc::clone(table), Arc::clone(resolver));
        for page in pages {
            rewriter.register_page(&page.url, &page.filename);
        }

        for page in pages {
            let path = output_dir.join(&page.filename);
            let html = match tokio::fs::read_to_string(&path).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Cannot read saved page {}: {e}", page.filename);
                    continue;
                }
            };
            match rewriter.rewrite_page(&html, &page.url, Path::new(&page.filename)) {
                Ok((rewritten, count)) => {
                    debug!("Rewrote {count} references in {}", page.filename);
                    if let Err(e) = atomic_write(&path, rewritten.into_bytes()).await {
                        warn!("Failed to write rewritten page {}: {e}", page.filename);
                    }
                }
                Err(e) => {
                    // The original page is preserved on rewrite failure.
                    warn!("Rewrite failed for {}: {e}", page.filename);
                }
            }
        }

        for asset in table.by_type(AssetType::Stylesheet) {
            if asset.status != DownloadStatus::Downloaded {
                continue;
            }
            let Some(local) = &asset.local_path else { continue };
            let path = output_dir.join(local);
            let Ok(css) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let (rewritten, count) =
                rewriter.rewrite_stylesheet(&css, &asset.url, Path::new(local));
            if count > 0 {
                if let Err(e) = atomic_write(&path, rewritten.into_bytes()).await {
                    warn!("Failed to write rewritten stylesheet {local}: {e}");
                }
            }
        }
    }

    fn page_filename(&self, url: &str, start_url: &str) -> String {
        if url == start_url {
            return "index.html".to_string();
        }
        url::Url::parse(url)
            .map(|u| page_filename_for_path(u.path()))
            .unwrap_or_else(|_| "index.html".to_string())
    }

    fn empty_report(&self) -> PayloadReport {
        PayloadReport::build(
            self.config.start_url().to_string(),
            Vec::new(),
            0,
            self.config.analysis_depth(),
        )
    }

    async fn transition(&self, session_id: &str, to: SessionStatus) -> CloneResult<()> {
        self.sessions.update_status(session_id, to).await?;
        Ok(())
    }

    fn emit_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        progress: f32,
        assets: AssetCounts,
    ) {
        self.events.publish(CloneEvent::StatusUpdate {
            session_id: session_id.to_string(),
            status,
            progress,
            assets,
        });
    }

    fn emit_asset_found(&self, session_id: &str, url: &str, table: &AssetTable) {
        if let Some(asset) = table.get(url) {
            self.events.publish(CloneEvent::AssetFound {
                session_id: session_id.to_string(),
                asset: AssetSummary {
                    url: asset.url,
                    asset_type: asset.asset_type.to_string(),
                    discovery_method: serde_json::to_value(asset.discovery_method)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    critical: asset.critical,
                    expected_size: asset.expected_size,
                },
            });
        }
    }
}
