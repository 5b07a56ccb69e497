//! Property-based tests using proptest
//!
//! These tests check invariants of the pure building blocks across
//! randomized inputs: configuration files, repository references, sizes
//! and the final command line.

use proptest::prelude::*;
use run_llm::launch::shell_quote;
use run_llm::models::hub::parse_size;
use run_llm::template::CATALOGUE;
use run_llm::{HfRepo, LaunchOptions, LaunchPlan, PromptTemplate, RunMode, RunnerConfig};
use std::path::{Path, PathBuf};

// =============================================================================
// Arbitrary Implementations
// =============================================================================

fn arb_mode() -> impl Strategy<Value = RunMode> {
    prop_oneof![Just(RunMode::ApiServer), Just(RunMode::Chat)]
}

/// Generate a RunnerConfig with a mix of answered and open questions
fn arb_runner_config() -> impl Strategy<Value = RunnerConfig> {
    (
        1u16..=65535,                                          // port
        prop::option::of("[a-zA-Z0-9-]{1,20}/[a-zA-Z0-9-]{1,30}"), // model_url
        prop::option::of("[a-zA-Z0-9.-]{1,30}\\.gguf"),        // weights
        prop::option::of(arb_mode()),
        prop::option::of(1u32..131072),                        // ctx_size
        prop::option::of(0u32..8192),                          // n_predict
        prop::option::of(0u32..200),                           // n_gpu_layers
        prop::option::of(any::<bool>()),                       // log_prompts
        prop::option::of("[a-zA-Z0-9 <|>/:]{0,10}"),          // reverse_prompt
    )
        .prop_map(
            |(port, model_url, weights, mode, ctx_size, n_predict, n_gpu_layers, log_prompts, reverse_prompt)| {
                RunnerConfig {
                    port,
                    model_url,
                    weights,
                    mode,
                    ctx_size,
                    n_predict,
                    n_gpu_layers,
                    log_prompts,
                    reverse_prompt,
                    ..Default::default()
                }
            },
        )
}

fn arb_launch_options() -> impl Strategy<Value = LaunchOptions> {
    (
        arb_mode(),
        "[a-zA-Z0-9._-]{1,40}\\.gguf",
        prop::sample::select(CATALOGUE.to_vec()),
        prop::option::of("[a-zA-Z0-9 <|>/:]{0,10}"),
        1u32..131072,
        0u32..8192,
        0u32..200,
        any::<bool>(),
        any::<bool>(),
        1u16..=65535,
    )
        .prop_map(
            |(mode, weights, template, reverse_prompt, ctx_size, n_predict, n_gpu_layers, log_prompts, log_stat, port)| {
                LaunchOptions {
                    mode,
                    weights,
                    prompt_template: template.name.to_string(),
                    reverse_prompt,
                    ctx_size,
                    n_predict,
                    n_gpu_layers,
                    log_prompts,
                    log_stat,
                    port,
                }
            },
        )
}

/// Undo POSIX single-quoting as produced by `shell_quote`
fn unquote(quoted: &str) -> String {
    let mut out = String::new();
    let mut in_quote = false;
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_quote = !in_quote,
            '\\' if !in_quote => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    out
}

// =============================================================================
// Config Serialization Round-Trip Tests
// =============================================================================

proptest! {
    /// RunnerConfig serializes to TOML and deserializes back to equal value
    #[test]
    fn runner_config_roundtrip(config in arb_runner_config()) {
        let toml_str = toml::to_string(&config).expect("Failed to serialize to TOML");
        let parsed: RunnerConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
        prop_assert_eq!(config, parsed);
    }

    /// Unanswered questions stay unanswered after a round trip
    #[test]
    fn open_questions_not_written(config in arb_runner_config()) {
        let toml_str = toml::to_string(&config).expect("Failed to serialize to TOML");
        prop_assert_eq!(config.ctx_size.is_some(), toml_str.contains("ctx_size"));
        prop_assert_eq!(config.mode.is_some(), toml_str.contains("mode ="));
    }
}

// =============================================================================
// Command Line Invariants
// =============================================================================

proptest! {
    /// The command always starts with the preload of the weights and the app
    #[test]
    fn launch_plan_fixed_prefix(options in arb_launch_options()) {
        let plan = LaunchPlan::new(Path::new("wasmedge"), &options, Path::new("."));

        prop_assert_eq!(&plan.args[0], "--dir");
        prop_assert_eq!(&plan.args[1], ".:.");
        prop_assert_eq!(&plan.args[2], "--nn-preload");
        prop_assert_eq!(plan.args[3].clone(), format!("default:GGML:AUTO:{}", options.weights));
        prop_assert_eq!(&plan.args[4], options.mode.wasm_file());
        prop_assert_eq!(plan.arg_value("-p"), Some(options.prompt_template.as_str()));
    }

    /// Every answer ends up in the command exactly as given
    #[test]
    fn launch_plan_carries_answers(options in arb_launch_options()) {
        let plan = LaunchPlan::new(Path::new("wasmedge"), &options, Path::new("."));

        let ctx = options.ctx_size.to_string();
        let n_predict = options.n_predict.to_string();
        let n_gpu_layers = options.n_gpu_layers.to_string();
        prop_assert_eq!(plan.arg_value("--ctx-size"), Some(ctx.as_str()));
        prop_assert_eq!(plan.arg_value("--n-predict"), Some(n_predict.as_str()));
        prop_assert_eq!(plan.arg_value("--n-gpu-layers"), Some(n_gpu_layers.as_str()));
        prop_assert_eq!(plan.has_flag("--log-prompts"), options.log_prompts);
        prop_assert_eq!(plan.has_flag("--log-stat"), options.log_stat);

        let reverse = options.reverse_prompt.as_deref().filter(|r| !r.is_empty());
        prop_assert_eq!(plan.has_flag("-r"), reverse.is_some());
        if let Some(reverse) = reverse {
            prop_assert_eq!(plan.arg_value("-r"), Some(reverse));
        }
    }

    /// Only the API server listens on a socket
    #[test]
    fn socket_only_for_api_server(options in arb_launch_options()) {
        let plan = LaunchPlan::new(Path::new("wasmedge"), &options, Path::new("."));

        match options.mode {
            RunMode::ApiServer => {
                let addr = format!("0.0.0.0:{}", options.port);
                prop_assert_eq!(plan.arg_value("--socket-addr"), Some(addr.as_str()));
            }
            RunMode::Chat => prop_assert!(!plan.has_flag("--socket-addr")),
        }
    }

    /// Quoting never changes the argument the shell sees
    #[test]
    fn shell_quote_preserves_argument(arg in "[^\\x00]{0,30}") {
        prop_assert_eq!(unquote(&shell_quote(&arg)), arg);
    }

    /// Plain arguments are printed as-is
    #[test]
    fn shell_quote_leaves_plain_words(arg in "[a-zA-Z0-9._:=-]{1,30}") {
        prop_assert_eq!(shell_quote(&arg), arg);
    }
}

// =============================================================================
// Repository and Size Invariants
// =============================================================================

proptest! {
    /// owner/name references parse to the same repository as their URLs
    #[test]
    fn repo_reference_forms_agree(
        owner in "[a-zA-Z0-9][a-zA-Z0-9_-]{0,20}",
        name in "[a-zA-Z0-9][a-zA-Z0-9_-]{0,30}",
        revision in "[a-z0-9]{1,12}",
    ) {
        let short = HfRepo::parse(&format!("{}/{}", owner, name)).unwrap();
        prop_assert_eq!(&short.owner, &owner);
        prop_assert_eq!(&short.name, &name);
        prop_assert_eq!(short.revision.as_str(), "main");

        let url = HfRepo::parse(&format!("https://huggingface.co/{}/{}/tree/{}", owner, name, revision)).unwrap();
        prop_assert_eq!(url.id(), short.id());
        prop_assert_eq!(url.revision, revision);
    }

    /// References containing whitespace are rejected
    #[test]
    fn repo_rejects_spaces(owner in "[a-z]{1,10}", name in "[a-z]{1,10}") {
        let reference = format!("{} {}/x", owner, name);
        prop_assert!(HfRepo::parse(&reference).is_err());
    }

    /// A displayed size parses back to within rounding of the byte count
    #[test]
    fn displayed_size_parses_back(bytes in 0u64..5_000_000_000_000) {
        let shown = run_llm::models::format_size(bytes);
        let parsed = parse_size(&shown).expect("formatted size should parse");

        let tolerance = (bytes as f64 * 0.005).max(0.5);
        prop_assert!((parsed as f64 - bytes as f64).abs() <= tolerance, "{} -> {} -> {}", bytes, shown, parsed);
    }
}

// =============================================================================
// Prompt Template Invariants
// =============================================================================

proptest! {
    /// Template names are matched regardless of case
    #[test]
    fn template_names_case_insensitive(template in prop::sample::select(CATALOGUE.to_vec())) {
        let parsed: PromptTemplate = template.name.to_uppercase().parse().unwrap();
        prop_assert_eq!(parsed, template);
    }
}

#[test]
fn work_dir_roundtrips_as_path() {
    let config = RunnerConfig {
        work_dir: PathBuf::from("/srv/models"),
        ..Default::default()
    };
    let parsed: RunnerConfig = toml::from_str(&toml::to_string(&config).unwrap()).unwrap();
    assert_eq!(parsed.work_dir, PathBuf::from("/srv/models"));
}
