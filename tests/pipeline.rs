use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use javafmt::{
    all_rules, run, run_and_output, ConfigBuilder, ConfiguredLevel, ExitStatus, FileProcessorPipeline,
    FormatMode, FormatStage, FormatterError, FormattingRule, FormattingViolation,
    IndexOverlayParser, InstantiatedRule, LanguageVersion, ParseStage, PipelineStage,
    ProcessingContext, Result, RuleConfiguration, RuleMeta, SecurityConfig, Severity, StageData,
    StageStatus, TransformationContext, ViolationSink, WriteStage,
};
use tempfile::tempdir;

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn check_mode_reports_violations_without_touching_files() {
    let dir = tempdir().unwrap();
    let source = "class A {   \n    int x;\n}";
    let path = write_file(&dir, "A.java", source);

    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path.clone()])
        .build()
        .unwrap();
    let status = run(&config).unwrap();

    assert_eq!(status.batch.success_count, 1);
    let rule_ids: Vec<&str> = status
        .violations
        .iter()
        .map(|violation| violation.rule_id.as_str())
        .collect();
    assert!(rule_ids.contains(&"trailing-whitespace"));
    assert!(rule_ids.contains(&"final-newline"));
    // untouched on disk
    assert_eq!(fs::read_to_string(&path).unwrap(), source);
}

#[test]
fn write_mode_rewrites_in_place_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = write_file(&dir, "B.java", "class B {   \n    int x;\t\n}");

    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path.clone()])
        .write(true)
        .build()
        .unwrap();
    let status = run(&config).unwrap();
    assert_eq!(status.batch.failure_count, 0, "{:?}", status.batch.errors);

    let rewritten = fs::read_to_string(&path).unwrap();
    assert_eq!(rewritten, "class B {\n    int x;\n}\n");

    // a second run changes nothing and reports nothing
    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path.clone()])
        .write(true)
        .build()
        .unwrap();
    let status = run(&config).unwrap();
    assert!(status.violations.is_empty());
    assert_eq!(fs::read_to_string(&path).unwrap(), rewritten);
}

#[test]
fn batch_isolation_under_continue() {
    let dir = tempdir().unwrap();
    let valid = write_file(&dir, "Valid.java", "class Valid {}\n");
    let missing = dir.path().join("Missing.java");
    let valid2 = write_file(&dir, "Valid2.java", "class Valid2 {}\n");

    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![valid, missing.clone(), valid2.clone()])
        .build()
        .unwrap();
    let status = run(&config).unwrap();

    assert_eq!(status.batch.total, 3);
    assert_eq!(status.batch.success_count, 2);
    assert_eq!(status.batch.failure_count, 1);
    assert!(status.batch.errors.contains_key(&missing));
    // the file after the failing one was still processed
    assert!(status.batch.outcomes[2].is_success());
    assert_eq!(status.batch.outcomes[2].path, valid2);
}

#[test]
fn exit_status_reflects_violations_in_check_mode_only() {
    let dir = tempdir().unwrap();
    let path = write_file(&dir, "C.java", "class C {}");

    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path.clone()])
        .quiet(true)
        .build()
        .unwrap();
    assert_eq!(run_and_output(&config), ExitStatus::FoundViolations);

    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path.clone()])
        .quiet(true)
        .write(true)
        .build()
        .unwrap();
    assert_eq!(run_and_output(&config), ExitStatus::Ok);
}

#[test]
fn unknown_rule_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = write_file(&dir, "D.java", "class D {}\n");
    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path])
        .rule("no-such-rule".to_owned())
        .quiet(true)
        .build()
        .unwrap();
    assert_eq!(run_and_output(&config), ExitStatus::ConfigError);
}

struct SpinUntilDeadline;

impl FormattingRule for SpinUntilDeadline {
    fn meta(&self) -> RuleMeta {
        RuleMeta {
            id: "spin-until-deadline",
            name: "Spin until deadline",
            description: "input-dependent loop that polls the deadline",
            default_severity: Severity::Info,
            fixable: false,
        }
    }

    fn analyze(
        &self,
        context: &TransformationContext<'_>,
        _configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>> {
        loop {
            context.check_deadline()?;
        }
    }

    fn format(
        &self,
        context: &TransformationContext<'_>,
        _configs: &[RuleConfiguration],
    ) -> Result<String> {
        Ok(context.source().to_owned())
    }
}

#[test]
fn deadline_expiry_fails_the_file_and_closes_the_arena() {
    let dir = tempdir().unwrap();
    let path = write_file(&dir, "Slow.java", "class Slow {}\n");

    let security = SecurityConfig {
        rule_timeout: Duration::from_millis(10),
        ..SecurityConfig::default()
    };
    let slow: Arc<dyn FormattingRule> = Arc::new(SpinUntilDeadline);
    let configuration = RuleConfiguration {
        name: "spin-until-deadline".into(),
        level: ConfiguredLevel::Default,
        options: None,
    };
    let rules = Arc::new(vec![InstantiatedRule::new(slow, &configuration).unwrap()]);
    let parser = Arc::new(IndexOverlayParser::with_defaults(security));
    let sink: ViolationSink = Default::default();
    let pipeline = FileProcessorPipeline::builder(security)
        .stage(ParseStage::new(Arc::clone(&parser), LanguageVersion::JAVA_21))
        .stage(FormatStage::new(
            rules,
            FormatMode::Check,
            sink,
            parser,
            LanguageVersion::JAVA_21,
        ))
        .build()
        .unwrap();

    let result = pipeline.process(&path);
    assert!(matches!(
        result.error(),
        Some(FormatterError::ExecutionTimeout { .. })
    ));
    // the arena acquired during parse was released on the failure path
    let arena = result.arena.as_ref().expect("parse stage ran");
    assert!(!arena.lock().unwrap().is_alive());
}

#[test]
fn write_stage_creates_missing_parent_directories() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("nested").join("deep").join("Out.java");
    let context = ProcessingContext::new(target.clone(), SecurityConfig::default());
    let status = WriteStage.execute(StageData::Text("class Out {}\n".into()), &context);
    assert!(matches!(status, StageStatus::Success(_)));
    assert_eq!(fs::read_to_string(&target).unwrap(), "class Out {}\n");
    // no stray temporary next to the output
    let siblings: Vec<_> = fs::read_dir(target.parent().unwrap()).unwrap().collect();
    assert_eq!(siblings.len(), 1);
}

#[test]
fn failed_rename_leaves_no_partial_file() {
    let dir = tempdir().unwrap();
    // a non-empty directory at the target path makes the rename fail
    let target = dir.path().join("Blocked.java");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("occupant"), "x").unwrap();

    let context = ProcessingContext::new(target.clone(), SecurityConfig::default());
    let status = WriteStage.execute(StageData::Text("class Blocked {}\n".into()), &context);
    assert!(matches!(
        status,
        StageStatus::Failure {
            error: FormatterError::WriteFailed { .. },
            ..
        }
    ));
    // the temporary was cleaned up and the target is untouched
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Blocked.java".to_owned()]);
    assert!(target.is_dir());
}

#[test]
fn configured_rule_options_flow_through_a_run() {
    let dir = tempdir().unwrap();
    let path = write_file(
        &dir,
        "Long.java",
        "class Long { int aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; }\n",
    );
    let config = ConfigBuilder::default()
        .all_rules(all_rules())
        .paths(vec![path])
        .rule_configurations(vec![RuleConfiguration {
            name: "line-length".into(),
            level: ConfiguredLevel::Error,
            options: Some(serde_json::json!({ "max-length": 20 })),
        }])
        .build()
        .unwrap();
    let status = run(&config).unwrap();
    assert_eq!(status.violations.len(), 1);
    assert_eq!(status.violations[0].rule_id, "line-length");
    assert_eq!(status.violations[0].severity, Severity::Error);
}
