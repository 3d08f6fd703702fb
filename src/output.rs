use console::Style;

use crate::context::MutationDetails;
use crate::mutants::MutantStatus;
use crate::state::{RunResult, SurvivedMutant};

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

fn location(m: &SurvivedMutant) -> String {
    if m.line == 0 {
        m.file.clone()
    } else {
        format!("{}:{}", m.file, m.line)
    }
}

pub fn print_run_result(result: &RunResult) {
    let score_pct = result.score * 100.0;
    let testable = result.total - result.unviable;

    if result.survived == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {} mutants, all killed ({:.1}%) in {:.1}s",
            style.apply_to("✓"),
            testable,
            score_pct,
            result.duration_ms as f64 / 1000.0,
        );
        return;
    }

    let style = Style::new().yellow().bold();
    println!(
        "{} {} survived / {} testable ({:.1}% killed) in {:.1}s",
        style.apply_to("!"),
        result.survived,
        testable,
        score_pct,
        result.duration_ms as f64 / 1000.0,
    );

    let dim = Style::new().dim();
    if result.unviable > 0 {
        println!("  {} {} unviable mutants skipped", dim.apply_to("·"), result.unviable);
    }
    if result.timeout > 0 {
        println!("  {} {} mutants timed out", dim.apply_to("·"), result.timeout);
    }
    if result.no_coverage > 0 {
        println!("  {} {} mutants not reached by any test", dim.apply_to("·"), result.no_coverage);
    }

    println!();
    for m in &result.survived_mutants {
        let ref_style = Style::new().cyan().bold();
        let op_style = Style::new().magenta();
        println!(
            "  {} {} {} {}",
            ref_style.apply_to(format!("@{}", m.ref_id)),
            location(m),
            dim.apply_to(format!("[{}]", m.policy)),
            op_style.apply_to(&m.description),
        );
    }
}

pub fn print_mutant_detail(m: &SurvivedMutant) {
    let ref_style = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!(
        "{} {} [{}]{}",
        ref_style.apply_to(format!("@{}", m.ref_id)),
        location(m),
        m.policy,
        if m.status == MutantStatus::NoCoverage { " (no coverage)" } else { "" },
    );
    println!("  {}", dim.apply_to(format!("{}.{}", m.class, m.method)));
    println!("  {}", m.description);
    println!();

    for line in m.diff.lines() {
        if line.starts_with('-') {
            println!("  {}", Style::new().red().apply_to(line));
        } else if line.starts_with('+') {
            println!("  {}", Style::new().green().apply_to(line));
        }
    }
}

pub fn print_status(result: &RunResult) {
    let score_pct = result.score * 100.0;
    let testable = result.total - result.unviable;

    println!(
        "Last run: {} mutants, {} killed, {} survived ({:.1}% score)",
        testable, result.killed, result.survived, score_pct,
    );

    if result.survived > 0 {
        println!();
        for m in &result.survived_mutants {
            let ref_style = Style::new().cyan().bold();
            println!(
                "  {} {} {}",
                ref_style.apply_to(format!("@{}", m.ref_id)),
                location(m),
                m.description,
            );
        }
        println!();
        println!("Use `droidmut show @m1` for details on a specific mutant.");
    }
}

/// Mutation sites as printed by `list`.
pub fn print_mutation_sites(sites: &[MutationDetails]) {
    let dim = Style::new().dim();
    for d in sites {
        let file = d.source_file.as_deref().unwrap_or(&d.id.class_name);
        println!(
            "  {}:{} {} {}",
            file,
            d.line,
            dim.apply_to(format!("[{}] {}", d.id.policy, d.id.method)),
            d.id.description,
        );
    }
}
