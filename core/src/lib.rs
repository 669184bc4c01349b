pub mod artifact;
pub mod bundle;
pub mod compiler;
pub mod config;
pub mod coverage;
pub mod definition;
pub mod docs;
pub mod guids;
pub mod naming;
pub mod pipeline;
pub mod toolchain;
pub mod transpile;
pub mod validation;

pub use artifact::{ArtifactFormat, DefinitionBuild, FormatOutcome, FormatStatus};
pub use compiler::{render_script_file, with_dependencies, CompilationError, Compiler};
pub use config::{BuildConfig, ConfigError, LayerConfig, ToolchainConfig, DEFAULT_CONFIG_FILE};
pub use coverage::{
    aggregate, navigator_layer, script_index, write_reports, AggregationError, Coverage,
    CoverageEntry, NavigatorLayer, ReportsWritten, ScriptIndexEntry,
};
pub use definition::{
    parse_definition_file, ArgSpec, ArgValue, DefinitionKey, Language, ParseError, RawRecord,
    TestDefinition,
};
pub use docs::{write_docs, DocsError};
pub use guids::{assign_guids, new_guid, GuidError, GuidLocation, GuidReport};
pub use naming::{artifact_path, relative_artifact_path, resolve_base_name};
pub use pipeline::{
    clean, compile_all, corpus_stats, discover, run_build, validate_corpus, BuildReport,
    CorpusStats, FormatTally, PipelineError, ValidationReport,
};
pub use toolchain::{SystemToolchain, Tool, ToolRequest, Toolchain, ToolchainError};
pub use transpile::{transpile, SwiftProgram, TranspileMode};
pub use validation::{validate_definition, validate_record, KeyRegistry, ValidationError};
