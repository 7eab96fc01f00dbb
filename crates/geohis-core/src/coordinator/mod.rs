//! Analysis coordinator.
//!
//! Drives one [`AnalysisRequest`] through the pipeline:
//!
//! ```text
//! Idle → Validating → Sampling → Scoring → Weighting → Combining
//!      → Classifying → Quantifying → ValidatingResults → Done
//! ```
//!
//! Terminal failures end in `RejectedInput`, `InconsistentWeights` or
//! `InternalError`. Cancellation is checked at every stage boundary and
//! between points in the per-point stage; a cancelled run returns the points
//! completed so far with `cancelled = true`.
//!
//! Unknown classes, missing frequency-ratio evidence and unavailable layers
//! drop the factor for the affected points and leave a warning in the
//! result. A point that loses its last factor for a hazard fails the run.

pub mod cancel;

pub use cancel::CancellationToken;

use geohis_common::{
    assign_point_ids, Band, Error, ErrorKind, ErrorRecord, FactorKind, FactorValue, Hazard,
    PointId, SessionId, Stage, StructuredError, StudyArea, WeightVector,
};
use geohis_config::EngineConfig;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::ahp::{solve_matrix, Consistency, PairwiseMatrix};
use crate::events::{event_names, EventStream, StageEvent, TelemetrySink};
use crate::exit_codes::ExitCode;
use crate::frequency_ratio::{self, FactorFrequencyRatio, FrClassEntry, FrError};
use crate::request::AnalysisRequest;
use crate::result::{
    AnalysisResult, AnalysisState, AnalysisSummary, CombinedRisk, FactorSignificance,
    HazardSummary, SusceptibilityScore,
};
use crate::sampler::{FactorLayer, FactorSampler};
use crate::scoring::{FactorScorer, ScoreOutcome, ScoringError};
use crate::susceptibility::{flood_si, fuse, landslide_raw, Classifier, LandslideScaler};
use crate::uncertainty::{
    bootstrap_point, oat_sensitivity, point_rng, summarize, Contribution, SensitivitySummary,
};
use crate::validation::{
    validate, SpatialGrouping, ValidationOptions, ValidationReport, ValidationSample,
};

/// Terminal failure of an analysis.
#[derive(Debug, Clone, Error, Serialize, JsonSchema)]
#[error("analysis failed during {stage}: {detail}")]
pub struct AnalysisFailure {
    pub session_id: SessionId,
    pub stage: Stage,
    pub state: AnalysisState,
    pub kind: ErrorKind,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_point_ids: Option<Vec<String>>,
    /// Structured detail of the failing error, such as the CR and the
    /// offending pairwise matrix.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    /// Warnings recorded before the failure, then the failure itself.
    pub errors: Vec<ErrorRecord>,
}

impl AnalysisFailure {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from_error_kind(self.kind)
    }
}

fn terminal_state(kind: ErrorKind) -> AnalysisState {
    match kind {
        ErrorKind::InconsistentJudgments => AnalysisState::InconsistentWeights,
        ErrorKind::InternalError => AnalysisState::InternalError,
        ErrorKind::Cancelled => AnalysisState::Cancelled,
        _ => AnalysisState::RejectedInput,
    }
}

/// Why the pipeline stopped early.
enum Halt {
    Failed(Box<AnalysisFailure>),
    Cancelled(Stage),
}

/// Runs analyses against a captured configuration and a set of layers.
///
/// The coordinator holds no per-analysis state; independent analyses may
/// share one coordinator.
pub struct AnalysisCoordinator {
    config: EngineConfig,
    layers: Vec<FactorLayer>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl AnalysisCoordinator {
    pub fn new(config: EngineConfig, layers: Vec<FactorLayer>) -> Self {
        AnalysisCoordinator {
            config,
            layers,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one analysis.
    ///
    /// A cancelled analysis is `Ok` with `cancelled = true`.
    pub fn run(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        let span = info_span!("analysis", session_id = %request.session_id);
        let _guard = span.enter();

        let mut run = Run::new(self, request, cancel);
        info!(points = request.points.len(), seed = run.seed, "analysis started");
        run.events.emit(
            StageEvent::new(event_names::ANALYSIS_STARTED, None)
                .with_detail("points", request.points.len())
                .with_detail("seed", run.seed),
        );

        match run.pipeline() {
            Ok(()) => {
                run.events.emit(
                    StageEvent::new(event_names::ANALYSIS_COMPLETED, None)
                        .with_detail("warnings", run.errors.len()),
                );
                info!(warnings = run.errors.len(), "analysis completed");
                Ok(run.finish(AnalysisState::Done, false))
            }
            Err(Halt::Cancelled(stage)) => {
                warn!(stage = %stage, completed_points = run.flood_scores.len(), "analysis cancelled");
                run.errors.push(ErrorRecord::from_error(&Error::Cancelled, stage));
                run.events.emit(
                    StageEvent::new(event_names::ANALYSIS_CANCELLED, Some(stage))
                        .with_detail("completed_points", run.flood_scores.len()),
                );
                Ok(run.finish(AnalysisState::Cancelled, true))
            }
            Err(Halt::Failed(failure)) => {
                warn!(
                    stage = %failure.stage,
                    kind = %failure.kind,
                    detail = %failure.detail,
                    "analysis failed"
                );
                run.events.emit(
                    StageEvent::new(event_names::ANALYSIS_FAILED, Some(failure.stage))
                        .with_detail("kind", failure.kind)
                        .with_detail("detail", &failure.detail),
                );
                Err(*failure)
            }
        }
    }
}

fn in_area_entries(
    scores: &[SusceptibilityScore],
) -> impl Iterator<Item = &[crate::uncertainty::SensitivityEntry]> {
    scores
        .iter()
        .filter(|s| s.in_area)
        .map(|s| s.sensitivity.as_slice())
}

/// Per-point model inputs after the combining stage.
struct PointModel {
    flood: Vec<(FactorKind, f64)>,
    flood_si: f64,
    landslide: Vec<Contribution>,
    landslide_si: f64,
}

type Sampled = BTreeMap<FactorKind, FactorValue>;

/// State of one analysis in flight.
struct Run<'a> {
    config: &'a EngineConfig,
    layers: &'a [FactorLayer],
    request: &'a AnalysisRequest,
    cancel: &'a CancellationToken,
    events: EventStream,
    seed: u64,
    study_area: StudyArea,
    ids: Vec<PointId>,
    in_area: Vec<bool>,
    flood_kinds: Vec<FactorKind>,
    landslide_kinds: Vec<FactorKind>,
    errors: Vec<ErrorRecord>,
    /// Factors dropped per point, in drop order.
    dropped: HashMap<String, Vec<(FactorKind, ErrorKind)>>,

    flood_weights: Option<WeightVector>,
    landslide_weights: Option<WeightVector>,
    flood_consistency: Option<Consistency>,
    frequency_ratios: Vec<FrClassEntry>,
    significance: Vec<FactorSignificance>,
    scaler: Option<LandslideScaler>,
    flood_classifier: Option<Classifier>,
    landslide_classifier: Option<Classifier>,
    flood_scores: Vec<SusceptibilityScore>,
    landslide_scores: Vec<SusceptibilityScore>,
    combined: Vec<CombinedRisk>,
    validation: Option<ValidationReport>,
}

impl<'a> Run<'a> {
    fn new(
        coordinator: &'a AnalysisCoordinator,
        request: &'a AnalysisRequest,
        cancel: &'a CancellationToken,
    ) -> Self {
        let config = &coordinator.config;
        Run {
            config,
            layers: &coordinator.layers,
            request,
            cancel,
            events: EventStream::new(request.session_id.to_string(), coordinator.sink.clone()),
            seed: request.resolved_seed(),
            study_area: request
                .study_area
                .clone()
                .unwrap_or_else(|| config.study_area.clone()),
            ids: assign_point_ids(&request.points),
            in_area: Vec::new(),
            flood_kinds: config.flood.pairwise.factors.clone(),
            landslide_kinds: config.landslide.factors.clone(),
            errors: Vec::new(),
            dropped: HashMap::new(),
            flood_weights: None,
            landslide_weights: None,
            flood_consistency: None,
            frequency_ratios: Vec::new(),
            significance: Vec::new(),
            scaler: None,
            flood_classifier: None,
            landslide_classifier: None,
            flood_scores: Vec::new(),
            landslide_scores: Vec::new(),
            combined: Vec::new(),
            validation: None,
        }
    }

    fn pipeline(&mut self) -> Result<(), Halt> {
        self.enter(Stage::Validating)?;
        self.validate_request()?;
        let in_area = self.in_area.iter().filter(|a| **a).count();
        self.leave(
            Stage::Validating,
            &[("points", json!(self.ids.len())), ("in_area", json!(in_area))],
        );

        self.enter(Stage::Sampling)?;
        let sampled = self.sample_points()?;
        self.leave(Stage::Sampling, &[("warnings", json!(self.errors.len()))]);

        self.enter(Stage::Scoring)?;
        let flood = self.score_flood(&sampled)?;
        self.leave(Stage::Scoring, &[("warnings", json!(self.errors.len()))]);

        self.enter(Stage::Weighting)?;
        let fitted = self.weigh(&sampled)?;
        self.leave(
            Stage::Weighting,
            &[
                ("cr", json!(self.flood_consistency.map(|c| c.cr))),
                ("fr_factors", json!(fitted.len())),
            ],
        );

        self.enter(Stage::Combining)?;
        let models = self.combine(&sampled, flood, &fitted)?;
        self.leave(Stage::Combining, &[]);

        self.enter(Stage::Classifying)?;
        self.classify(&models);
        self.leave(Stage::Classifying, &[]);

        self.enter(Stage::Quantifying)?;
        self.quantify(&models)?;
        self.leave(
            Stage::Quantifying,
            &[("points", json!(self.flood_scores.len()))],
        );

        self.enter(Stage::ValidatingResults)?;
        self.validate_results()?;
        self.leave(
            Stage::ValidatingResults,
            &[("auc", json!(self.validation.as_ref().map(|v| v.auc)))],
        );
        Ok(())
    }

    fn enter(&mut self, stage: Stage) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled(stage));
        }
        debug!(stage = %stage, "stage started");
        self.events.stage_started(stage);
        Ok(())
    }

    fn leave(&self, stage: Stage, details: &[(&str, Value)]) {
        debug!(stage = %stage, "stage completed");
        self.events.stage_completed(stage, details);
    }

    fn failure(&self, stage: Stage, kind: ErrorKind, detail: String, points: Vec<String>) -> Halt {
        self.failure_with_context(stage, kind, detail, points, BTreeMap::new())
    }

    fn failure_with_context(
        &self,
        stage: Stage,
        kind: ErrorKind,
        detail: String,
        points: Vec<String>,
        context: BTreeMap<String, Value>,
    ) -> Halt {
        let record = ErrorRecord {
            kind,
            stage,
            detail: detail.clone(),
            affected_point_ids: None,
            recoverable: false,
        }
        .with_points(points);
        let mut errors = self.errors.clone();
        errors.push(record.clone());
        Halt::Failed(Box::new(AnalysisFailure {
            session_id: self.request.session_id,
            stage,
            state: terminal_state(kind),
            kind,
            detail,
            affected_point_ids: record.affected_point_ids,
            context,
            errors,
        }))
    }

    fn fail(&self, stage: Stage, err: Error, points: Vec<String>) -> Halt {
        let context = StructuredError::from(&err).context;
        self.failure_with_context(stage, err.kind(), err.to_string(), points, context)
    }

    fn malformed(&self, detail: impl Into<String>, points: Vec<String>) -> Halt {
        self.fail(Stage::Validating, Error::MalformedInput(detail.into()), points)
    }

    /// Record a recoverable drop of `factor` for `points`.
    fn drop_factor(
        &mut self,
        stage: Stage,
        kind: ErrorKind,
        factor: FactorKind,
        detail: String,
        points: Vec<String>,
    ) {
        warn!(stage = %stage, factor = %factor, points = points.len(), "{}", detail);
        self.events.emit(
            StageEvent::new(event_names::FACTOR_DROPPED, Some(stage))
                .with_detail("factor", factor)
                .with_detail("kind", kind)
                .with_detail("points", points.len()),
        );
        for id in &points {
            self.dropped
                .entry(id.clone())
                .or_default()
                .push((factor, kind));
        }
        self.errors.push(
            ErrorRecord {
                kind,
                stage,
                detail,
                affected_point_ids: None,
                recoverable: true,
            }
            .with_points(points),
        );
    }

    /// Kind of the most recent drop among `kinds` at a point.
    fn last_drop_kind(&self, point_id: &str, kinds: &[FactorKind]) -> ErrorKind {
        self.dropped
            .get(point_id)
            .and_then(|drops| drops.iter().rev().find(|(f, _)| kinds.contains(f)))
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::SamplingError)
    }

    fn no_factor_left(&self, stage: Stage, hazard: Hazard, point_id: &PointId) -> Halt {
        let kinds = match hazard {
            Hazard::Flood => &self.flood_kinds,
            Hazard::Landslide => &self.landslide_kinds,
        };
        self.failure(
            stage,
            self.last_drop_kind(point_id.as_str(), kinds),
            format!("no {} factor remains for point {}", hazard, point_id),
            vec![point_id.to_string()],
        )
    }

    // ------------------------------------------------------------------
    // Validating
    // ------------------------------------------------------------------

    fn validate_request(&mut self) -> Result<(), Halt> {
        let request = self.request;
        if request.points.is_empty() {
            return Err(self.malformed("request must contain at least one point", Vec::new()));
        }
        for (point, id) in request.points.iter().zip(&self.ids) {
            point
                .validate()
                .map_err(|e| self.fail(Stage::Validating, e, vec![id.to_string()]))?;
        }

        let mut seen = BTreeSet::new();
        let duplicates: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !seen.insert(id.as_str()))
            .map(|id| id.to_string())
            .collect();
        if !duplicates.is_empty() {
            return Err(self.malformed("point ids must be unique", duplicates));
        }

        self.study_area
            .validate()
            .map_err(|e| self.fail(Stage::Validating, e, Vec::new()))?;
        self.in_area = request
            .points
            .iter()
            .map(|p| self.study_area.contains(p))
            .collect();

        let options = &request.options;
        if let Some(t) = options.decision_threshold {
            if !(0.0..=100.0).contains(&t) {
                return Err(self.malformed(
                    format!("decision_threshold must lie in [0, 100], got {}", t),
                    Vec::new(),
                ));
            }
        }
        if options.cv_folds == Some(1) {
            return Err(self.malformed(
                "cv_folds must be 0 (disabled) or at least 2",
                Vec::new(),
            ));
        }
        if let Some(SpatialGrouping::Grid {
            cell_deg: Some(cell),
        }) = &options.spatial_grouping
        {
            if !(cell.is_finite() && *cell > 0.0) {
                return Err(self.malformed(
                    format!("spatial grid cell_deg must be positive, got {}", cell),
                    Vec::new(),
                ));
            }
        }

        if let Some(overrides) = &request.weights_override {
            let scorer = FactorScorer::new(self.config);
            if overrides.flood.is_some() && overrides.flood_pairwise.is_some() {
                return Err(self.malformed(
                    "weights_override may set flood or flood_pairwise, not both",
                    Vec::new(),
                ));
            }
            if let Some(w) = &overrides.flood {
                let w = w
                    .normalized()
                    .map_err(|e| self.fail(Stage::Validating, e, Vec::new()))?;
                self.flood_kinds = w.kinds();
            }
            if let Some(pairwise) = &overrides.flood_pairwise {
                self.flood_kinds = pairwise.factors.clone();
            }
            if let Some(kind) = self.flood_kinds.iter().find(|k| !scorer.has_rule(**k)) {
                return Err(self.malformed(
                    format!("flood weights name {}, which has no scoring rule", kind),
                    Vec::new(),
                ));
            }
            if let Some(w) = &overrides.landslide {
                let w = w
                    .normalized()
                    .map_err(|e| self.fail(Stage::Validating, e, Vec::new()))?;
                let tallies = &self.config.landslide.tallies;
                if let Some(kind) = w.kinds().iter().find(|k| !tallies.contains_key(k)) {
                    return Err(self.malformed(
                        format!("landslide weights name {}, which has no class tallies", kind),
                        Vec::new(),
                    ));
                }
                self.landslide_kinds = w.kinds();
            }
        }

        if let Some(inventory) = &request.inventory {
            let known: BTreeSet<&str> = self.ids.iter().map(|id| id.as_str()).collect();
            let unknown: Vec<String> = inventory
                .keys()
                .filter(|id| !known.contains(id.as_str()))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(self.malformed("inventory names unknown point ids", unknown));
            }
            let bad: Vec<String> = inventory
                .iter()
                .filter(|(_, label)| **label > 1)
                .map(|(id, _)| id.clone())
                .collect();
            if !bad.is_empty() {
                return Err(self.malformed("inventory labels must be 0 or 1", bad));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    fn sample_points(&mut self) -> Result<Vec<Sampled>, Halt> {
        let stage = Stage::Sampling;
        let sampler = FactorSampler::new(self.layers.to_vec(), self.config);
        let mut used = self.flood_kinds.clone();
        for kind in &self.landslide_kinds {
            if !used.contains(kind) {
                used.push(*kind);
            }
        }

        let mut out = Vec::with_capacity(self.ids.len());
        let mut missing: BTreeMap<FactorKind, Vec<String>> = BTreeMap::new();
        for (point, id) in self.request.points.iter().zip(&self.ids) {
            let values = sampler.sample(point, id).map_err(|e| {
                let point_id = e.point_id().to_string();
                self.fail(stage, e.into(), vec![point_id])
            })?;
            let mut by_kind: Sampled = values
                .into_iter()
                .filter(|v| v.is_available() && used.contains(&v.kind))
                .map(|v| (v.kind, v))
                .collect();
            for kind in &used {
                if !by_kind.contains_key(kind) {
                    missing.entry(*kind).or_default().push(id.to_string());
                }
            }
            by_kind.retain(|k, _| used.contains(k));
            out.push(by_kind);
        }

        for (kind, points) in missing {
            self.drop_factor(
                stage,
                ErrorKind::SamplingError,
                kind,
                format!("factor {} is unavailable; dropped for affected points", kind),
                points,
            );
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    fn score_flood(&mut self, sampled: &[Sampled]) -> Result<Vec<Vec<(FactorKind, f64)>>, Halt> {
        let stage = Stage::Scoring;
        let scorer = FactorScorer::new(self.config);
        let mut unknown: BTreeMap<(FactorKind, String), Vec<String>> = BTreeMap::new();
        let mut out = Vec::with_capacity(sampled.len());

        for (values, id) in sampled.iter().zip(&self.ids) {
            let mut scores = Vec::with_capacity(self.flood_kinds.len());
            for kind in &self.flood_kinds {
                let Some(value) = values.get(kind) else {
                    continue;
                };
                match scorer.score(value) {
                    Ok(ScoreOutcome::Scored(score)) => scores.push((score.kind, score.normalized)),
                    Ok(ScoreOutcome::Skipped(_)) => {}
                    Err(ScoringError::UnknownClass { kind, class_label }) => {
                        unknown
                            .entry((kind, class_label))
                            .or_default()
                            .push(id.to_string());
                    }
                    Err(err) => return Err(self.fail(stage, err.into(), vec![id.to_string()])),
                }
            }
            out.push(scores);
        }

        for ((kind, class_label), points) in unknown {
            let err = Error::UnknownClass { kind, class_label };
            self.drop_factor(
                stage,
                ErrorKind::UnknownClass,
                kind,
                format!("{}; flood factor dropped for affected points", err),
                points,
            );
        }
        for (scores, id) in out.iter().zip(&self.ids) {
            if scores.is_empty() {
                return Err(self.no_factor_left(stage, Hazard::Flood, id));
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Weighting
    // ------------------------------------------------------------------

    fn weigh(&mut self, sampled: &[Sampled]) -> Result<Vec<FactorFrequencyRatio>, Halt> {
        let stage = Stage::Weighting;
        let config = self.config;
        let request = self.request;
        let overrides = request.weights_override.as_ref();

        let flood_override = overrides.and_then(|o| o.flood.as_ref());
        let pairwise_override = overrides.and_then(|o| o.flood_pairwise.as_ref());
        let (flood_weights, consistency) = if let Some(w) = flood_override {
            let w = w.normalized().map_err(|e| self.fail(stage, e, Vec::new()))?;
            (w, None)
        } else {
            let matrix = match pairwise_override {
                Some(p) => PairwiseMatrix::new(p.factors.clone(), p.matrix.clone()),
                None => PairwiseMatrix::from_config(&config.flood.pairwise),
            }
            .map_err(|e| self.fail(stage, e.into(), Vec::new()))?;
            let solution =
                solve_matrix(&matrix).map_err(|e| self.fail(stage, e.into(), Vec::new()))?;
            info!(
                cr = solution.cr(),
                iterations = solution.iterations,
                converged = solution.converged,
                "flood weights derived"
            );
            (solution.weights, Some(solution.consistency))
        };
        self.flood_weights = Some(flood_weights);
        self.flood_consistency = consistency;

        let significance = request.options.enable_significance_test;
        let mut fitted = Vec::with_capacity(self.landslide_kinds.len());
        for kind in self.landslide_kinds.clone() {
            let tallies = config
                .landslide
                .tallies
                .get(&kind)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let result = if significance {
                frequency_ratio::fit_with_test(kind, tallies)
            } else {
                frequency_ratio::fit(kind, tallies)
            };
            match result {
                Ok(f) => fitted.push(f),
                Err(err) => {
                    let points: Vec<String> = sampled
                        .iter()
                        .zip(&self.ids)
                        .filter(|(values, _)| values.contains_key(&kind))
                        .map(|(_, id)| id.to_string())
                        .collect();
                    let err = Error::from(err);
                    self.drop_factor(
                        stage,
                        err.kind(),
                        kind,
                        format!("{}; landslide factor dropped", err),
                        points,
                    );
                }
            }
        }

        let landslide_weights = match overrides.and_then(|o| o.landslide.as_ref()) {
            Some(w) => w.normalized().map_err(|e| self.fail(stage, e, Vec::new()))?,
            None => config.landslide_weights().ok_or_else(|| {
                self.fail(
                    stage,
                    Error::Config("landslide weights do not form a valid vector".to_string()),
                    Vec::new(),
                )
            })?,
        };
        self.landslide_weights = Some(landslide_weights);

        self.frequency_ratios = fitted.iter().flat_map(|f| f.classes.clone()).collect();
        if significance {
            self.significance = fitted
                .iter()
                .map(|f| FactorSignificance {
                    factor: f.kind,
                    smoothed: f.smoothed,
                    chi_square: f.chi_square,
                })
                .collect();
        }
        Ok(fitted)
    }

    // ------------------------------------------------------------------
    // Combining
    // ------------------------------------------------------------------

    fn combine(
        &mut self,
        sampled: &[Sampled],
        flood: Vec<Vec<(FactorKind, f64)>>,
        fitted: &[FactorFrequencyRatio],
    ) -> Result<Vec<PointModel>, Halt> {
        let stage = Stage::Combining;
        let (Some(flood_w), Some(landslide_w)) =
            (self.flood_weights.clone(), self.landslide_weights.clone())
        else {
            return Err(self.fail(
                stage,
                Error::internal("weights_present", "weights missing after the weighting stage"),
                Vec::new(),
            ));
        };

        let mut unknown: BTreeMap<(FactorKind, String), Vec<String>> = BTreeMap::new();
        let mut partial: Vec<(Vec<(FactorKind, f64)>, f64, Vec<Contribution>)> =
            Vec::with_capacity(sampled.len());
        for ((values, id), scores) in sampled.iter().zip(&self.ids).zip(flood) {
            let si = flood_si(&scores, &flood_w).ok_or_else(|| {
                self.fail(
                    stage,
                    Error::internal(
                        "flood_si_defined",
                        format!("no scored factor of point {} carries a flood weight", id),
                    ),
                    vec![id.to_string()],
                )
            })?;

            let mut contributions = Vec::with_capacity(fitted.len());
            for fr in fitted {
                let Some(value) = values.get(&fr.kind) else {
                    continue;
                };
                let label = value
                    .class_label
                    .clone()
                    .unwrap_or_else(|| "unclassified".to_string());
                match fr.contribution(&label) {
                    Ok(ratio) => {
                        let scale = fr.max_fr();
                        contributions.push(Contribution {
                            kind: fr.kind,
                            normalized: if scale > 0.0 { ratio / scale } else { 0.0 },
                            scale,
                        });
                    }
                    Err(FrError::UnknownClass { kind, class_label }) => {
                        unknown
                            .entry((kind, class_label))
                            .or_default()
                            .push(id.to_string());
                    }
                    Err(err) => return Err(self.fail(stage, err.into(), vec![id.to_string()])),
                }
            }
            partial.push((scores, si, contributions));
        }

        for ((kind, class_label), points) in unknown {
            let err = Error::UnknownClass { kind, class_label };
            self.drop_factor(
                stage,
                ErrorKind::UnknownClass,
                kind,
                format!("{}; landslide factor dropped for affected points", err),
                points,
            );
        }

        let mut raws = Vec::with_capacity(partial.len());
        for ((_, _, contributions), id) in partial.iter().zip(&self.ids) {
            if contributions.is_empty() {
                return Err(self.no_factor_left(stage, Hazard::Landslide, id));
            }
            let ratios: Vec<(FactorKind, f64)> =
                contributions.iter().map(|c| (c.kind, c.value())).collect();
            let raw = landslide_raw(&ratios, &landslide_w).ok_or_else(|| {
                self.fail(
                    stage,
                    Error::internal(
                        "landslide_raw_defined",
                        format!("no ratio of point {} carries a landslide weight", id),
                    ),
                    vec![id.to_string()],
                )
            })?;
            raws.push(raw);
        }

        let in_area_raw: Vec<f64> = raws
            .iter()
            .zip(&self.in_area)
            .filter(|(_, inside)| **inside)
            .map(|(r, _)| *r)
            .collect();
        let fitted_kinds: Vec<FactorKind> = fitted.iter().map(|f| f.kind).collect();
        let theoretical = landslide_w
            .restricted_to(&fitted_kinds)
            .map(|w| {
                fitted.iter().fold((0.0, 0.0), |(lo, hi), f| {
                    let wk = w.get(f.kind).unwrap_or(0.0);
                    (lo + wk * f.min_fr(), hi + wk * f.max_fr())
                })
            })
            .unwrap_or((0.0, 0.0));
        let scaler = LandslideScaler::fit(&in_area_raw, theoretical);
        if scaler.theoretical {
            debug!(
                low = scaler.low,
                high = scaler.high,
                "observed landslide range is degenerate; using theoretical range"
            );
        }
        self.scaler = Some(scaler);

        Ok(partial
            .into_iter()
            .zip(raws)
            .map(|((flood, flood_si, landslide), raw)| PointModel {
                flood,
                flood_si,
                landslide,
                landslide_si: scaler.rescale(raw),
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Classifying
    // ------------------------------------------------------------------

    fn classify(&mut self, models: &[PointModel]) {
        let inside = |si: fn(&PointModel) -> f64| -> Vec<f64> {
            models
                .iter()
                .zip(&self.in_area)
                .filter(|(_, a)| **a)
                .map(|(m, _)| si(m))
                .collect()
        };
        let flood = inside(|m| m.flood_si);
        let landslide = inside(|m| m.landslide_si);
        let classification = &self.config.classification;
        self.flood_classifier = Some(Classifier::from_in_area(&flood, classification));
        self.landslide_classifier = Some(Classifier::from_in_area(&landslide, classification));
    }

    // ------------------------------------------------------------------
    // Quantifying
    // ------------------------------------------------------------------

    fn quantify(&mut self, models: &[PointModel]) -> Result<(), Halt> {
        let stage = Stage::Quantifying;
        let (Some(flood_w), Some(landslide_w), Some(scaler), Some(flood_c), Some(landslide_c)) = (
            self.flood_weights.clone(),
            self.landslide_weights.clone(),
            self.scaler,
            self.flood_classifier.clone(),
            self.landslide_classifier.clone(),
        ) else {
            return Err(self.fail(
                stage,
                Error::internal("model_complete", "quantifying before the model was built"),
                Vec::new(),
            ));
        };
        let uncertainty = &self.config.uncertainty;
        let b = self
            .request
            .options
            .bootstrap_b
            .unwrap_or(uncertainty.bootstrap_b);
        let with_sensitivity = self.request.options.enable_sensitivity;
        let landslide_si_of = |c: &[(FactorKind, f64)], w: &WeightVector| {
            landslide_raw(c, w).map(|raw| scaler.rescale(raw))
        };

        for (i, model) in models.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Halt::Cancelled(stage));
            }
            let id = &self.ids[i];
            let in_area = self.in_area[i];

            let flood_contributions: Vec<Contribution> = model
                .flood
                .iter()
                .map(|(kind, score)| Contribution {
                    kind: *kind,
                    normalized: *score,
                    scale: 1.0,
                })
                .collect();
            let mut rng = point_rng(self.seed, Hazard::Flood, id);
            let (ci_low, ci_high) = bootstrap_point(
                model.flood_si,
                &flood_contributions,
                uncertainty,
                b,
                &mut rng,
                |c| flood_si(c, &flood_w),
            );
            let flood_band = flood_c.band(model.flood_si);
            let flood_score = SusceptibilityScore {
                hazard: Hazard::Flood,
                point_id: id.to_string(),
                si: model.flood_si,
                band: flood_band,
                ci_low,
                ci_high,
                in_area,
                factors_used: model.flood.iter().map(|(k, _)| *k).collect(),
                sensitivity: if with_sensitivity {
                    oat_sensitivity(model.flood_si, &model.flood, &flood_w, flood_si)
                } else {
                    Vec::new()
                },
            };

            let ratios: Vec<(FactorKind, f64)> =
                model.landslide.iter().map(|c| (c.kind, c.value())).collect();
            let mut rng = point_rng(self.seed, Hazard::Landslide, id);
            let (ci_low, ci_high) = bootstrap_point(
                model.landslide_si,
                &model.landslide,
                uncertainty,
                b,
                &mut rng,
                |c| landslide_si_of(c, &landslide_w),
            );
            let landslide_band = landslide_c.band(model.landslide_si);
            let landslide_score = SusceptibilityScore {
                hazard: Hazard::Landslide,
                point_id: id.to_string(),
                si: model.landslide_si,
                band: landslide_band,
                ci_low,
                ci_high,
                in_area,
                factors_used: ratios.iter().map(|(k, _)| *k).collect(),
                sensitivity: if with_sensitivity {
                    oat_sensitivity(model.landslide_si, &ratios, &landslide_w, landslide_si_of)
                } else {
                    Vec::new()
                },
            };

            self.combined.push(CombinedRisk {
                point_id: id.to_string(),
                flood_band,
                landslide_band,
                band: fuse(flood_band, landslide_band),
            });
            self.flood_scores.push(flood_score);
            self.landslide_scores.push(landslide_score);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // ValidatingResults
    // ------------------------------------------------------------------

    fn validate_results(&mut self) -> Result<(), Halt> {
        let stage = Stage::ValidatingResults;
        let Some(inventory) = &self.request.inventory else {
            return Ok(());
        };
        let options = &self.request.options;
        let hazard = options.validation_hazard;
        let scores = match hazard {
            Hazard::Flood => &self.flood_scores,
            Hazard::Landslide => &self.landslide_scores,
        };
        let samples: Vec<ValidationSample> = scores
            .iter()
            .zip(&self.request.points)
            .filter(|(s, _)| s.in_area)
            .filter_map(|(s, p)| {
                inventory.get(&s.point_id).map(|label| ValidationSample {
                    point_id: s.point_id.clone(),
                    latitude: p.latitude,
                    longitude: p.longitude,
                    si: s.si,
                    label: *label == 1,
                })
            })
            .collect();

        let defaults = &self.config.validation;
        let validation_options = ValidationOptions {
            decision_threshold: options
                .decision_threshold
                .unwrap_or(defaults.decision_threshold),
            cv_folds: options.cv_folds.unwrap_or(defaults.cv_folds),
            auc_bootstrap_b: options.auc_bootstrap_b.unwrap_or(defaults.auc_bootstrap_b),
            min_class_samples: defaults.min_class_samples,
            grid_cell_deg: defaults.grid_cell_deg,
            spatial_grouping: options.spatial_grouping.clone(),
            seed: self.seed,
        };
        let report = validate(hazard, &samples, &validation_options)
            .map_err(|e| self.fail(stage, e.into(), Vec::new()))?;
        self.validation = Some(report);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Result assembly
    // ------------------------------------------------------------------

    fn finish(self, state: AnalysisState, cancelled: bool) -> AnalysisResult {
        let mut combined_band_counts: BTreeMap<Band, usize> =
            Band::ALL.iter().map(|b| (*b, 0)).collect();
        for (risk, inside) in self.combined.iter().zip(&self.in_area) {
            if *inside {
                *combined_band_counts.entry(risk.band).or_insert(0) += 1;
            }
        }

        let sensitivity_summary = SensitivitySummary {
            flood: summarize(&self.flood_kinds, in_area_entries(&self.flood_scores)),
            landslide: summarize(&self.landslide_kinds, in_area_entries(&self.landslide_scores)),
        };

        let summary = AnalysisSummary {
            flood: HazardSummary::from_scores(&self.flood_scores, self.flood_classifier),
            landslide: HazardSummary::from_scores(
                &self.landslide_scores,
                self.landslide_classifier,
            ),
            combined_band_counts,
            landslide_scaler: self.scaler,
            significance: self.significance,
        };

        AnalysisResult {
            session_id: self.request.session_id,
            timestamp: self.request.requested_at,
            seed: self.seed,
            state,
            cancelled,
            study_area: self.study_area,
            in_area_count: self.in_area.iter().filter(|a| **a).count(),
            flood_weights: self.flood_weights,
            landslide_weights: self.landslide_weights,
            flood_consistency: self.flood_consistency,
            flood_scores: self.flood_scores,
            landslide_scores: self.landslide_scores,
            combined_risk: self.combined,
            frequency_ratios: self.frequency_ratios,
            summary,
            sensitivity_summary,
            validation: self.validation,
            errors: self.errors,
            config_hash: geohis_config::snapshot::config_hash(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;
    use crate::request::{PairwiseOverride, WeightsOverride};
    use crate::sampler::{table_layers, TableSource};
    use geohis_common::{Point, RawValue};

    fn row(
        table: &mut TableSource,
        id: &str,
        elevation: f64,
        slope: f64,
        land_use: &str,
        geology: &str,
    ) {
        let pid = PointId::from(id);
        table.insert(pid.clone(), FactorKind::Elevation, RawValue::Numeric(elevation));
        table.insert(pid.clone(), FactorKind::Slope, RawValue::Numeric(slope));
        table.insert(pid.clone(), FactorKind::DrainageProximity, RawValue::Numeric(150.0));
        table.insert(pid.clone(), FactorKind::LandUse, land_use.into());
        table.insert(pid.clone(), FactorKind::SoilPermeability, "moderate".into());
        table.insert(pid.clone(), FactorKind::Aspect, RawValue::Numeric(200.0));
        table.insert(pid.clone(), FactorKind::Geology, geology.into());
        table.insert(pid.clone(), FactorKind::LandCover, "grassland".into());
        table.insert(pid, FactorKind::Rainfall, RawValue::Numeric(1100.0));
    }

    fn fixture() -> (AnalysisCoordinator, AnalysisRequest) {
        let mut table = TableSource::new();
        row(&mut table, "a", 4.0, 1.0, "built_up", "alluvium");
        row(&mut table, "b", 30.0, 12.0, "forest", "togo_quartzite");
        row(&mut table, "c", 70.0, 28.0, "agriculture", "accraian_sandstone");
        row(&mut table, "d", 15.0, 3.0, "wetland", "dahomeyan_gneiss");
        let points = vec![
            Point::new(5.60, -0.20).with_id("a"),
            Point::new(5.70, -0.10).with_id("b"),
            Point::new(5.80, 0.10).with_id("c"),
            Point::new(5.55, -0.30).with_id("d"),
        ];
        let coordinator =
            AnalysisCoordinator::new(EngineConfig::default(), table_layers(Arc::new(table)));
        let mut request = AnalysisRequest::new(SessionId::new(), points);
        request.seed = Some(11);
        request.options.bootstrap_b = Some(50);
        (coordinator, request)
    }

    #[test]
    fn test_full_run_shapes() {
        let (coordinator, request) = fixture();
        let result = coordinator.run(&request, &CancellationToken::new()).unwrap();
        assert_eq!(result.state, AnalysisState::Done);
        assert!(!result.cancelled);
        assert_eq!(result.in_area_count, 4);
        assert_eq!(result.flood_scores.len(), 4);
        assert_eq!(result.landslide_scores.len(), 4);
        assert_eq!(result.combined_risk.len(), 4);
        assert!(result.flood_consistency.unwrap().cr <= 0.10);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let ids: Vec<&str> = result.flood_scores.iter().map(|s| s.point_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        for s in result.flood_scores.iter().chain(&result.landslide_scores) {
            assert!((0.0..=100.0).contains(&s.si));
            assert!(s.ci_low <= s.si && s.si <= s.ci_high);
        }
        // Landslide SI spans the observed range.
        let ls: Vec<f64> = result.landslide_scores.iter().map(|s| s.si).collect();
        assert!(ls.iter().any(|v| *v == 0.0));
        assert!(ls.iter().any(|v| *v == 100.0));
        assert_eq!(result.frequency_ratios.len(), 5 + 4 + 4 + 7 + 4);
    }

    #[test]
    fn test_stage_events_in_order() {
        let (coordinator, request) = fixture();
        let sink = Arc::new(CollectingSink::new());
        let coordinator = coordinator.with_sink(sink.clone());
        coordinator.run(&request, &CancellationToken::new()).unwrap();

        let events = sink.events();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());
        let started: Vec<Stage> = events
            .iter()
            .filter(|e| e.event == event_names::STAGE_STARTED)
            .filter_map(|e| e.stage)
            .collect();
        assert_eq!(started, Stage::ORDERED.to_vec());
        assert_eq!(events.last().unwrap().event, event_names::ANALYSIS_COMPLETED);
    }

    #[test]
    fn test_unknown_class_drops_factor() {
        let (_, mut request) = fixture();
        let mut table = TableSource::new();
        row(&mut table, "a", 4.0, 1.0, "built_up", "alluvium");
        row(&mut table, "b", 30.0, 12.0, "moon_dust", "togo_quartzite");
        let coordinator =
            AnalysisCoordinator::new(EngineConfig::default(), table_layers(Arc::new(table)));
        request.points.truncate(2);

        let result = coordinator.run(&request, &CancellationToken::new()).unwrap();
        let warning = &result.errors[0];
        assert_eq!(warning.kind, ErrorKind::UnknownClass);
        assert_eq!(warning.stage, Stage::Scoring);
        assert!(warning.recoverable);
        assert_eq!(warning.affected_point_ids, Some(vec!["b".to_string()]));
        assert!(!result.flood_scores[1]
            .factors_used
            .contains(&FactorKind::LandUse));
        assert!(result.flood_scores[0]
            .factors_used
            .contains(&FactorKind::LandUse));
    }

    #[test]
    fn test_last_factor_drop_is_terminal() {
        let mut table = TableSource::new();
        table.insert(PointId::from("x"), FactorKind::LandUse, "moon_dust".into());
        table.insert(PointId::from("x"), FactorKind::Geology, "alluvium".into());
        let coordinator =
            AnalysisCoordinator::new(EngineConfig::default(), table_layers(Arc::new(table)));
        let request = AnalysisRequest::new(
            SessionId::new(),
            vec![Point::new(5.6, -0.2).with_id("x")],
        );
        let failure = coordinator
            .run(&request, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Scoring);
        assert_eq!(failure.kind, ErrorKind::UnknownClass);
        assert_eq!(failure.state, AnalysisState::RejectedInput);
        assert_eq!(failure.affected_point_ids, Some(vec!["x".to_string()]));
        assert!(failure.errors.iter().any(|e| e.recoverable));
    }

    #[test]
    fn test_inconsistent_pairwise_override() {
        let (coordinator, mut request) = fixture();
        request.weights_override = Some(WeightsOverride {
            flood_pairwise: Some(PairwiseOverride {
                factors: vec![
                    FactorKind::Elevation,
                    FactorKind::Slope,
                    FactorKind::LandUse,
                ],
                matrix: vec![
                    vec![1.0, 9.0, 1.0],
                    vec![1.0 / 9.0, 1.0, 9.0],
                    vec![1.0, 1.0 / 9.0, 1.0],
                ],
            }),
            ..Default::default()
        });
        let failure = coordinator
            .run(&request, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InconsistentJudgments);
        assert_eq!(failure.state, AnalysisState::InconsistentWeights);
        assert_eq!(failure.stage, Stage::Weighting);
        assert_eq!(failure.exit_code(), ExitCode::InconsistentWeights);
        let matrix = failure.context["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[0], json!([1.0, 9.0, 1.0]));
        assert!(failure.context["cr"].as_f64().unwrap() > 0.1);
    }

    #[test]
    fn test_flood_weight_override_is_renormalized() {
        let (coordinator, mut request) = fixture();
        request.weights_override = Some(WeightsOverride {
            flood: Some(
                WeightVector::new([(FactorKind::Elevation, 2.0), (FactorKind::Slope, 2.0)])
                    .unwrap(),
            ),
            ..Default::default()
        });
        let result = coordinator.run(&request, &CancellationToken::new()).unwrap();
        let w = result.flood_weights.unwrap();
        assert_eq!(w.len(), 2);
        assert!((w.get(FactorKind::Elevation).unwrap() - 0.5).abs() < 1e-12);
        assert!(result.flood_consistency.is_none());
        assert_eq!(
            result.flood_scores[0].factors_used,
            vec![FactorKind::Elevation, FactorKind::Slope]
        );
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let (coordinator, request) = fixture();
        let cancel = CancellationToken::new();

        let mut empty = request.clone();
        empty.points.clear();
        let f = coordinator.run(&empty, &cancel).unwrap_err();
        assert_eq!((f.kind, f.stage), (ErrorKind::MalformedInput, Stage::Validating));

        let mut bad_lat = request.clone();
        bad_lat.points[0] = Point::new(95.0, 0.0).with_id("a");
        let f = coordinator.run(&bad_lat, &cancel).unwrap_err();
        assert_eq!(f.affected_point_ids, Some(vec!["a".to_string()]));

        let mut inventory = request.clone();
        inventory.inventory = Some([("zz".to_string(), 1u8)].into_iter().collect());
        let f = coordinator.run(&inventory, &cancel).unwrap_err();
        assert_eq!(f.kind, ErrorKind::MalformedInput);

        let mut label = request.clone();
        label.inventory = Some([("a".to_string(), 2u8)].into_iter().collect());
        let f = coordinator.run(&label, &cancel).unwrap_err();
        assert_eq!(f.state, AnalysisState::RejectedInput);

        for cell in [0.0, -0.05, f64::NAN] {
            let mut grid = request.clone();
            grid.options.spatial_grouping = Some(SpatialGrouping::Grid {
                cell_deg: Some(cell),
            });
            let f = coordinator.run(&grid, &cancel).unwrap_err();
            assert_eq!((f.kind, f.stage), (ErrorKind::MalformedInput, Stage::Validating));
            assert!(f.detail.contains("cell_deg"), "{}", f.detail);
        }
    }

    #[test]
    fn test_cancelled_before_start_returns_empty_partial() {
        let (coordinator, request) = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = coordinator.run(&request, &cancel).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.state, AnalysisState::Cancelled);
        assert!(result.flood_scores.is_empty());
        assert_eq!(result.errors.last().unwrap().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_out_of_area_points_scored_but_not_summarized() {
        let (coordinator, mut request) = fixture();
        request.points[2] = Point::new(9.0, 1.5).with_id("c");
        let result = coordinator.run(&request, &CancellationToken::new()).unwrap();
        assert_eq!(result.in_area_count, 3);
        assert!(!result.flood_scores[2].in_area);
        assert_eq!(result.summary.flood.in_area_points, 3);
        assert_eq!(result.summary.flood.scored_points, 4);
    }

    #[test]
    fn test_insufficient_validation_samples() {
        let (coordinator, mut request) = fixture();
        request.inventory = Some(
            [("a".to_string(), 1u8), ("b".to_string(), 0u8)]
                .into_iter()
                .collect(),
        );
        let failure = coordinator
            .run(&request, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InsufficientSamples);
        assert_eq!(failure.stage, Stage::ValidatingResults);
        assert_eq!(failure.exit_code(), ExitCode::InsufficientSamples);
    }
}
