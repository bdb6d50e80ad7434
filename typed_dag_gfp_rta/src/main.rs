use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::thread::available_parallelism;
use std::time::Duration;

mod batch;
mod outputs_result;

use batch::{analyze_files, FileOutcome};
use lib::analysis::AnalysisConfig;
use lib::nfj_dag::NfjMode;
use lib::output_log::*;
use lib::task_set_creator::get_task_set_paths_from_dir;
use log::error;
use outputs_result::dump_batch_result_to_file;

/// Application description and arguments definition using clap crate
#[derive(Parser)]
#[clap(group(
    ArgGroup::new("input")
        .required(true)
        .args(["task_set_file_path", "task_set_dir_path"])
))]
/// Application arguments definition using clap crate
struct ArgParser {
    /// Task-set file (.csv, .yaml or .yml) to analyze.
    #[clap(short = 'f', long = "task_set_file_path")]
    task_set_file_path: Option<String>,
    /// Directory whose task-set files are analyzed as a batch.
    #[clap(short = 'd', long = "task_set_dir_path")]
    task_set_dir_path: Option<String>,
    /// Directory where the result YAML file is written.
    #[clap(short = 'o', long = "output_dir_path", default_value = "../outputs")]
    output_dir_path: String,
    /// Judge every task by its intra-task WCRT alone.
    #[clap(short = 's', long = "single_dag")]
    single_dag: bool,
    /// Keep cross-join edges that lie on a critical path.
    #[clap(short = 'r', long = "reserved_nfj")]
    reserved_nfj: bool,
    /// Wall-clock limit per task-set file in seconds.
    #[clap(short = 't', long = "timeout_secs")]
    timeout_secs: Option<u64>,
    /// Number of task-set files analyzed at once.
    #[clap(short = 'j', long = "threads")]
    threads: Option<usize>,
}

impl ArgParser {
    fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            nfj_mode: if self.reserved_nfj {
                NfjMode::Reserved
            } else {
                NfjMode::Unconditional
            },
            intra_task_only: self.single_dag,
            ..AnalysisConfig::default()
        }
    }

    fn threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| available_parallelism().map_or(1, |threads| threads.get()))
    }
}

fn file_stem(file_path: &Path) -> String {
    file_path
        .file_stem()
        .map_or_else(|| "task_set".to_string(), |stem| stem.to_string_lossy().into_owned())
}

fn main() {
    env_logger::init();
    let arg: ArgParser = ArgParser::parse();
    let config = arg.analysis_config();
    let timeout = arg.timeout_secs.map(Duration::from_secs);

    if let Some(task_set_file_path) = &arg.task_set_file_path {
        let file_paths = vec![PathBuf::from(task_set_file_path)];
        let outcomes = analyze_files(&file_paths, &config, 1, timeout);
        let file_path = create_result_yaml_file(
            &arg.output_dir_path,
            &format!("{}-result", file_stem(&file_paths[0])),
        );
        if let Some((_, FileOutcome::Analyzed { task_set, analysis })) = outcomes.first() {
            dump_task_set_info_to_yaml(&file_path, task_set);
            dump_task_set_result_to_yaml(&file_path, analysis);
        }
        dump_batch_result_to_file(&file_path, &outcomes);
    } else if let Some(task_set_dir_path) = &arg.task_set_dir_path {
        let file_paths = match get_task_set_paths_from_dir(task_set_dir_path) {
            Ok(file_paths) => file_paths,
            Err(err) => {
                error!("{}: {}", task_set_dir_path, err);
                exit(1);
            }
        };
        let outcomes = analyze_files(&file_paths, &config, arg.threads(), timeout);
        let file_path = create_result_yaml_file(&arg.output_dir_path, "batch-result");
        dump_batch_result_to_file(&file_path, &outcomes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_parser_defaults() {
        let arg = ArgParser::parse_from(["typed_dag_gfp_rta", "-f", "tasks.csv"]);
        assert_eq!(arg.output_dir_path, "../outputs");
        assert_eq!(arg.analysis_config(), AnalysisConfig::default());
        assert!(arg.threads() >= 1);
        assert_eq!(arg.timeout_secs, None);
    }

    #[test]
    fn test_arg_parser_flags() {
        let arg = ArgParser::parse_from([
            "typed_dag_gfp_rta",
            "-d",
            "task_sets",
            "-s",
            "-r",
            "-t",
            "30",
            "-j",
            "4",
        ]);
        let config = arg.analysis_config();
        assert_eq!(config.nfj_mode, NfjMode::Reserved);
        assert!(config.intra_task_only);
        assert_eq!(arg.threads(), 4);
        assert_eq!(arg.timeout_secs, Some(30));
    }

    #[test]
    fn test_arg_parser_requires_input() {
        assert!(ArgParser::try_parse_from(["typed_dag_gfp_rta"]).is_err());
        assert!(ArgParser::try_parse_from([
            "typed_dag_gfp_rta",
            "-f",
            "tasks.csv",
            "-d",
            "task_sets"
        ])
        .is_err());
    }

    #[test]
    fn test_file_stem_normal() {
        assert_eq!(file_stem(Path::new("../data/set_01.csv")), "set_01");
    }
}
