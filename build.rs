use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Only the crate's own sources are linted.
const SOURCE_DIRS: [&str; 4] = ["stability", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

/// What a rule looks for and how its violations are explained.
struct Rule {
    title: &'static str,
    pattern: String,
    advice: &'static str,
    accept: fn(&str) -> bool,
}

// Collects the matching lines of one file that the rule accepts as violations.
struct LineCollector {
    accept: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for LineCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.accept)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = run_rules() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            title: "underscore-prefixed variables",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            advice: "Either use the variable (removing the underscore) or remove it completely.",
            accept: underscore_in_code,
        },
        Rule {
            title: "forbidden comment words",
            pattern: format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            advice: "Comments must describe the code, not its history. Remove the comment.",
            accept: |_| true,
        },
        Rule {
            title: "'**' in plain comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            advice: "The '**' pattern is only allowed in doc comments.",
            accept: |line| !line.trim_start().starts_with("///"),
        },
        Rule {
            title: "all-uppercase comments",
            pattern: r"(//|/\*).*".to_string(),
            advice: "Comments where every letter is uppercase are not allowed.",
            accept: all_uppercase_comment,
        },
        Rule {
            title: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            advice: "Either use the code or remove it completely.",
            accept: |_| true,
        },
    ]
}

fn run_rules() -> Result<(), Box<dyn Error>> {
    let sources = rust_sources();
    let mut searcher = Searcher::new();
    for rule in rules() {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
        for path in &sources {
            let mut collector = LineCollector {
                accept: rule.accept,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;
            if !collector.violations.is_empty() {
                let mut message = format!(
                    "\n❌ ERROR: Found {} {} in {}:\n",
                    collector.violations.len(),
                    rule.title,
                    path.display()
                );
                for violation in &collector.violations {
                    message.push_str(&format!("   {violation}\n"));
                }
                message.push_str(&format!("\n⚠️ {}\n", rule.advice));
                return Err(message.into());
            }
        }
    }
    Ok(())
}

// Matches inside comments and string literals are not variables.
fn underscore_in_code(line: &str) -> bool {
    if line.trim_start().starts_with("//") || line.contains("/*") {
        return false;
    }
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn all_uppercase_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    let comment = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(idx) = line.find("/*") {
        let rest = &line[idx + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };
    let letters: Vec<char> = comment.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}
