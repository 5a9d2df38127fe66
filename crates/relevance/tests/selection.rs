use context_graph::{DependencyGraph, DependencyMapper};
use context_protocol::{FileRecord, FunctionSymbol};
use context_relevance::{
    Candidate, ContextBudget, ContextBuilder, FileProfile, InclusionMode, InsightKind,
    TaskDescriptor,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn profiles(records: &[FileRecord]) -> Vec<FileProfile> {
    records.iter().map(FileProfile::from_record).collect()
}

fn candidates<'a>(records: &'a [FileRecord], profiles: &'a [FileProfile]) -> Vec<Candidate<'a>> {
    records
        .iter()
        .zip(profiles)
        .map(|(record, profile)| Candidate::new(record, profile))
        .collect()
}

fn login_universe() -> Vec<FileRecord> {
    vec![
        FileRecord::from_source("docs/readme.md", "# Project\n\nSee the guides.\n"),
        FileRecord::from_source(
            "ui/button.tsx",
            "export function Button(props) {\n  return <button>{props.label}</button>;\n}\n",
        ),
        FileRecord::from_source(
            "auth/login.ts",
            "export async function login(user, password) {\n  const session = await authenticate(user, password);\n  return session;\n}\n",
        )
        .with_functions(vec![FunctionSymbol::new("login", 1, 4)]),
    ]
}

#[test]
fn login_task_ranks_auth_first_and_docs_last() {
    let records = login_universe();
    let profiles = profiles(&records);
    let graph = DependencyMapper::new().build(&records).unwrap();
    let tasks = vec![TaskDescriptor::new("fix authentication bug in login flow")];

    let context = ContextBuilder::new().select(
        &tasks,
        &candidates(&records, &profiles),
        &graph,
        ContextBudget::default(),
    );

    assert!(!context.degraded);
    assert_eq!(
        context.paths(),
        vec!["auth/login.ts", "ui/button.tsx", "docs/readme.md"]
    );
    assert!(context.files.iter().all(|f| f.mode == InclusionMode::Full));
    assert!(context.files[0]
        .reasons()
        .iter()
        .any(|r| r.starts_with("path matches")));
    assert_eq!(context.metadata.total_candidates, 3);
    assert_eq!(context.metadata.completeness_pct, 100.0);
    assert!(context
        .insights
        .iter()
        .any(|i| i.kind == InsightKind::Guidance));
}

#[test]
fn oversized_file_is_downgraded_to_summary() {
    let big = format!("export function login() {{\n{}}}\n", "  step();\n".repeat(400));
    let records = vec![
        FileRecord::from_source("auth/login.ts", big)
            .with_functions(vec![FunctionSymbol::new("login", 1, 402)]),
    ];
    let profiles = profiles(&records);
    let tasks = vec![TaskDescriptor::new("login")];

    let context = ContextBuilder::new().select(
        &tasks,
        &candidates(&records, &profiles),
        &DependencyGraph::default(),
        ContextBudget::new(300, 5),
    );

    assert_eq!(context.files.len(), 1);
    let file = &context.files[0];
    assert_eq!(file.mode, InclusionMode::Summary);
    assert_eq!(file.content, profiles[0].summary);
    assert!(file.token_estimate <= 300);
    assert_eq!(context.metadata.summarized_files, 1);
    assert_eq!(context.metadata.completeness_pct, 50.0);
}

#[test]
fn file_that_fits_neither_way_is_skipped() {
    let records = vec![FileRecord::from_source(
        "auth/login.ts",
        "export const login = () => session;\n".repeat(50),
    )];
    let profiles = profiles(&records);

    let context = ContextBuilder::new().select(
        &[TaskDescriptor::new("login")],
        &candidates(&records, &profiles),
        &DependencyGraph::default(),
        ContextBudget::new(2, 5),
    );

    assert!(context.files.is_empty());
    assert_eq!(context.metadata.skipped_files, 1);
    assert!(!context.recommendations.is_empty());
}

#[test]
fn max_files_bounds_selection() {
    let records: Vec<FileRecord> = (0..10)
        .map(|i| FileRecord::from_source(format!("src/mod{i}.ts"), "export const x = 1;\n"))
        .collect();
    let profiles = profiles(&records);

    let context = ContextBuilder::new().select(
        &[TaskDescriptor::new("anything")],
        &candidates(&records, &profiles),
        &DependencyGraph::default(),
        ContextBudget::new(10_000, 3),
    );

    assert_eq!(context.paths(), vec!["src/mod0.ts", "src/mod1.ts", "src/mod2.ts"]);
}

#[test]
fn equal_scores_break_ties_by_path() {
    let records = vec![
        FileRecord::from_source("src/b.ts", "export const v = 1;\n"),
        FileRecord::from_source("src/a.ts", "export const v = 1;\n"),
        FileRecord::from_source("src/c.ts", "export const v = 1;\n"),
    ];
    let profiles = profiles(&records);
    let builder = ContextBuilder::new();
    let tasks = [TaskDescriptor::new("update value")];
    let graph = DependencyGraph::default();

    let first = builder.select(&tasks, &candidates(&records, &profiles), &graph, ContextBudget::default());
    let second = builder.select(&tasks, &candidates(&records, &profiles), &graph, ContextBudget::default());

    assert_eq!(first.paths(), vec!["src/a.ts", "src/b.ts", "src/c.ts"]);
    assert_eq!(first, second);
}

#[test]
fn duplicate_candidates_degrade_instead_of_failing() {
    let records = vec![
        FileRecord::from_source("src/a.ts", "export const a = 1;\n"),
        FileRecord::from_source("src/a.ts", "export const a = 2;\n"),
    ];
    let profiles = profiles(&records);
    let builder = ContextBuilder::new();
    let candidates = candidates(&records, &profiles);

    assert!(builder
        .try_select(&[], &candidates, &DependencyGraph::default(), ContextBudget::default())
        .is_err());

    let context = builder.select(&[], &candidates, &DependencyGraph::default(), ContextBudget::default());
    assert!(context.degraded);
    assert!(context.files.is_empty());
    assert_eq!(context.insights.len(), 1);
    assert_eq!(context.insights[0].kind, InsightKind::Diagnostic);
}

#[test]
fn zero_budget_degrades() {
    let context = ContextBuilder::new().select(
        &[TaskDescriptor::new("login")],
        &[],
        &DependencyGraph::default(),
        ContextBudget::new(0, 10),
    );
    assert!(context.degraded);
}

#[test]
fn cycles_among_selected_files_are_reported() {
    let records = vec![
        FileRecord::from_source("src/a.ts", "import { b } from './b';\n").with_imports(["./b"]),
        FileRecord::from_source("src/b.ts", "import { a } from './a';\n").with_imports(["./a"]),
    ];
    let profiles = profiles(&records);
    let graph = DependencyMapper::new().build(&records).unwrap();

    let context = ContextBuilder::new().select(
        &[TaskDescriptor::new("refactor module a")],
        &candidates(&records, &profiles),
        &graph,
        ContextBudget::default(),
    );

    let cycle = context
        .insights
        .iter()
        .find(|i| i.kind == InsightKind::CircularDependency)
        .expect("cycle insight");
    assert!(cycle.message.contains("src/a.ts -> src/b.ts -> src/a.ts"));
}

proptest! {
    #[test]
    fn selection_never_exceeds_budget(
        sizes in prop::collection::vec(0usize..4_000, 0..25),
        max_tokens in 1usize..3_000,
        max_files in 1usize..10,
    ) {
        let records: Vec<FileRecord> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                FileRecord::from_source(format!("src/login{i}.ts"), "x".repeat(*size))
                    .with_imports(["react"])
            })
            .collect();
        let profiles = profiles(&records);

        let context = ContextBuilder::new().select(
            &[TaskDescriptor::new("fix the login screen")],
            &candidates(&records, &profiles),
            &DependencyGraph::default(),
            ContextBudget::new(max_tokens, max_files),
        );

        prop_assert!(!context.degraded);
        prop_assert!(context.total_tokens() <= max_tokens);
        prop_assert!(context.files.len() <= max_files);
        prop_assert_eq!(context.metadata.total_tokens, context.total_tokens());
    }
}
