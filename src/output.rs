use console::Style;

use crate::report::{CoverageGapRecord, MutationStats};
use crate::splice::SpliceOutcome;
use crate::state::{DeployDecision, WorkflowState};
use crate::workflow::StageSummary;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_warning(msg: &str) {
    let style = Style::new().yellow().bold();
    println!("{} {}", style.apply_to("!"), msg);
}

pub fn print_stage_summary(summary: &StageSummary) {
    let mark = if summary.skipped.is_empty() {
        Style::new().green().bold().apply_to("✓")
    } else {
        Style::new().yellow().bold().apply_to("!")
    };
    println!(
        "{} {}: {}/{} applied, {} test methods added",
        mark, summary.stage, summary.applied, summary.attempted, summary.methods_added,
    );

    let dim = Style::new().dim();
    for file in &summary.files_written {
        println!("  {} {}", dim.apply_to("+"), file.display());
    }
    for skip in &summary.skipped {
        println!("  {} {} ({})", dim.apply_to("·"), skip.item, dim.apply_to(&skip.reason));
    }

    if let Some(tests) = &summary.tests {
        println!(
            "  tests: {} passed, {} failed, {} errors, {} skipped",
            tests.passed, tests.failed, tests.errors, tests.skipped,
        );
    }
    if let Some(gaps) = summary.coverage_gaps {
        println!("  modules below full coverage: {}", gaps);
    }
    if let Some(stats) = &summary.mutation {
        print_mutation_line("mutation", stats);
    }
}

fn print_mutation_line(label: &str, stats: &MutationStats) {
    println!(
        "  {}: {:.1}% score, {} killed, {} survived, {} timeout, {} incompetent ({} total)",
        label,
        stats.mutation_score,
        stats.killed,
        stats.survived,
        stats.timeout,
        stats.incompetent,
        stats.total,
    );
}

pub fn print_gaps(gaps: &[CoverageGapRecord]) {
    if gaps.is_empty() {
        print_success("All modules fully covered.");
        return;
    }
    let pct_style = Style::new().yellow();
    for gap in gaps {
        println!(
            "  {} {} statements, {} branches missing {}",
            gap.module_path,
            gap.statements_missing,
            gap.branches_missing,
            pct_style.apply_to(format!("[{}%]", gap.coverage_percent)),
        );
    }
}

pub fn print_splice_outcome(outcome: &SpliceOutcome) {
    match outcome {
        SpliceOutcome::Inserted { methods, placement, .. } => print_success(&format!(
            "Inserted {} method(s) into {} before line {}",
            methods,
            placement.class_name,
            placement.insertion_point + 1,
        )),
        SpliceOutcome::EmptyFragment => print_warning("Fragment has no test methods; file unchanged."),
        SpliceOutcome::NoTestClass => {
            print_warning("No unittest.TestCase class found; create one by hand. File unchanged.")
        }
        SpliceOutcome::Rejected { issues } => {
            print_error("Spliced file does not parse; file unchanged.");
            let dim = Style::new().dim();
            for issue in issues {
                let kind = if issue.missing { "missing token" } else { "syntax error" };
                eprintln!("  {} {}:{} {}", dim.apply_to("·"), issue.line, issue.column, kind);
            }
        }
        SpliceOutcome::Misplaced { expected, found } => print_error(&format!(
            "Class would hold {found} test method(s) after the splice, expected {expected}; file unchanged."
        )),
    }
}

pub fn print_status(state: &WorkflowState, threshold: f64) {
    println!("Phase: {:?}", state.phase());

    let latches = [
        ("tests generated", state.generated),
        ("coverage improved", state.coverage_improved),
        ("failures fixed", state.fixed),
        ("mutation measured (before)", state.mutation_measured_before),
        ("mutation tests generated", state.mutation_tests_generated),
        ("mutation measured (after)", state.mutation_measured_after),
    ];
    let on = Style::new().green();
    let dim = Style::new().dim();
    for (name, set) in latches {
        if set {
            println!("  {} {}", on.apply_to("●"), name);
        } else {
            println!("  {} {}", dim.apply_to("○"), dim.apply_to(name));
        }
    }

    if state.initial_stats.is_some() || state.final_stats.is_some() {
        println!();
        print_mutation_comparison(state.initial_stats.as_ref(), state.final_stats.as_ref());
    }

    if let Some(decision) = state.deploy_decision(threshold) {
        println!();
        print_decision(decision, threshold);
    }

    let available: Vec<_> = state.available_actions().iter().map(|a| a.name()).collect();
    println!();
    println!("Available: {}", available.join(", "));
}

pub fn print_mutation_comparison(before: Option<&MutationStats>, after: Option<&MutationStats>) {
    let cell = |s: Option<&MutationStats>, f: fn(&MutationStats) -> String| s.map(f).unwrap_or_else(|| "-".into());
    let rows: [(&str, fn(&MutationStats) -> String); 6] = [
        ("killed", |s| s.killed.to_string()),
        ("survived", |s| s.survived.to_string()),
        ("timeout", |s| s.timeout.to_string()),
        ("incompetent", |s| s.incompetent.to_string()),
        ("total", |s| s.total.to_string()),
        ("score", |s| format!("{:.1}%", s.mutation_score)),
    ];

    let header = Style::new().bold();
    println!("  {:<12} {:>10} {:>10}", header.apply_to("metric"), header.apply_to("before"), header.apply_to("after"));
    for (name, f) in rows {
        println!("  {:<12} {:>10} {:>10}", name, cell(before, f), cell(after, f));
    }
}

pub fn print_decision(decision: DeployDecision, threshold: f64) {
    match decision {
        DeployDecision::DeployEligible => {
            print_success(&format!("Deploy eligible: mutation score at or above {:.1}%", threshold))
        }
        DeployDecision::DeployBlocked => {
            print_error(&format!("Deploy blocked: mutation score below {:.1}%", threshold))
        }
    }
}
