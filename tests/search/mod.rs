//! Search orchestration tests.

mod orchestrator_test;

/// Verify the public search types are exported from the library.
#[test]
fn all_search_types_exported() {
    use rgscope::search::{
        global_phase, validate, CaseMode, GlobRule, Orchestrator, OrchestratorConfig, Phase,
        PhaseCell, PipelineError, SearchHistory, SearchParameters, ValidationError,
    };

    let _ = OrchestratorConfig::default();
    let _ = SearchHistory::default();
    let _ = PhaseCell::new();
    let _ = GlobRule::Include("*".into());
    let _ = CaseMode::Smart;
    let _: fn() -> PipelineError = || PipelineError::ParserStopped;
    let _: fn(SearchParameters) -> Result<SearchParameters, ValidationError> = validate;
    let _ = Orchestrator::builder();
    assert_eq!(global_phase().get(), global_phase().get());
    assert_eq!(Phase::default(), Phase::Idle);
}
