use sentiro::{AnnotatedClause, Element, ExtractOutput, ExtractResult};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(clauses: &[AnnotatedClause], output: &ExtractOutput, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Extracting: {} clauses", clauses.len()), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Clauses ━━━", ansi::GRAY));
    print_clauses(clauses, output, &palette);

    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));
    if output.results.is_empty() {
        println!("{}", palette.dim("  No opinions extracted"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • No token carries lexicon polarity (no anchors)");
        println!("  • No rule pattern matched the dependency tree");
        println!("  • Candidates were dropped by span, pronoun or emotion checks");
        println!("\n{}", palette.dim("  Tip: Set SENTIRO_LOG=sentiro=debug to see bindings and drops"));
    } else {
        for (idx, result) in output.results.iter().enumerate() {
            print_result(idx, result, &palette);
        }
    }

    let metrics = &output.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Matching: {}  │  Assembly: {}  │  Dedup: {}  │  Scoring: {}",
        palette.paint(format!("{:?}", metrics.total), ansi::GREEN),
        palette.paint(format!("{:?}", metrics.stage_total(|c| c.matching)), ansi::CYAN),
        palette.paint(format!("{:?}", metrics.stage_total(|c| c.assembly)), ansi::CYAN),
        palette.dim(format!("{:?}", metrics.stage_total(|c| c.dedup))),
        palette.dim(format!("{:?}", metrics.stage_total(|c| c.scoring))),
    );
    println!();
}

fn print_clauses(clauses: &[AnnotatedClause], output: &ExtractOutput, palette: &ansi::Palette) {
    for (idx, clause) in clauses.iter().enumerate() {
        let label = palette.paint(format!("[{idx}]"), ansi::GRAY);
        if let Some(skipped) = output.skipped.iter().find(|s| s.index == idx) {
            let reason = palette.paint(format!("✗ {}", skipped.reason), ansi::RED);
            println!("  {} {} {}", label, palette.dim(clause.text.trim()), reason);
            continue;
        }
        let found = output.results.iter().filter(|r| r.clause_index == idx).count();
        let bindings = output.metrics.clauses.iter().find(|c| c.index == idx).map(|c| c.bindings).unwrap_or(0);
        println!(
            "  {} {} {}",
            label,
            clause.text.trim(),
            if found > 0 {
                palette.paint(format!("✓ {found} results ({bindings} bindings)"), ansi::GREEN)
            } else {
                palette.dim(format!("✗ 0 results ({bindings} bindings)"))
            }
        );
    }
}

fn print_result(idx: usize, result: &ExtractResult, palette: &ansi::Palette) {
    let score_color = if result.sent_score < 0.0 { ansi::RED } else { ansi::GREEN };
    println!(
        "  {} {} {} {}  {} {}",
        palette.paint(format!("[{}]", idx), ansi::GRAY),
        palette.bold(palette.paint(format!("{:+.3}", result.sent_score), score_color)),
        palette.dim("│"),
        palette.paint(format!("intensity {}", result.sent_intensity), ansi::YELLOW),
        palette.dim("│ pattern:"),
        palette.paint(result.pattern.to_string(), ansi::CYAN),
    );
    for (name, element, negated) in [
        ("holder", &result.holder, false),
        ("emotion", &result.emotion, result.emotion_negated),
        ("object", &result.object, false),
        ("reason", &result.reason, result.reason_negated),
    ] {
        if element.is_empty() {
            continue;
        }
        println!("      {} {}", palette.dim(format!("{name:>7}:")), fmt_element(element, negated, palette));
    }
}

fn fmt_element(element: &Element, negated: bool, palette: &ansi::Palette) -> String {
    let span = match element.char_range {
        Some((start, end)) => format!("{start}..{end}"),
        None => String::new(),
    };
    format!(
        "{}{} {}",
        palette.paint(&element.text, ansi::BLUE),
        if negated { palette.paint(" (negated)", ansi::RED) } else { String::new() },
        palette.dim(span)
    )
}
