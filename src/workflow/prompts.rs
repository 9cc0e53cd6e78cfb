//! Agent prompts. Each starts with a `## Task:` heading naming the job.

use crate::config::IssueContext;
use crate::repo::ChangeSet;
use crate::repo::artifacts::{COMMIT_MSG, PLAN, REVIEW, TODO};

/// Largest diff embedded in a review prompt.
const MAX_DIFF_CHARS: usize = 200_000;

pub fn plan(issue: &IssueContext, target_branch: &str) -> String {
    let description = if issue.description.trim().is_empty() {
        "(no description)"
    } else {
        issue.description.trim()
    };
    format!(
        r#"## Task: produce a work plan

You are planning the implementation of an issue. Do not modify any files except `{plan}`.

### Issue #{iid}: {title}

{description}

### Output

Write `{plan}` in the current directory, or reply with only a JSON object, in this shape:

{{"branch": "issue-{iid}-short-slug", "todo": ["- [ ] first task", "- [ ] second task"]}}

- `branch`: lowercase words joined by dashes, starting with `issue-{iid}-`. It will be created from `{target}`.
- `todo`: ordered, concrete tasks. At least one.
"#,
        plan = PLAN,
        iid = issue.iid,
        title = issue.title,
        description = description,
        target = target_branch,
    )
}

/// What the implementation step should do.
pub enum Assignment<'a> {
    /// Work through the checklist seeded into the working copy.
    Checklist(&'a str),
    /// Apply a reviewer's free-text instruction.
    Instruction(&'a str),
}

pub struct ImplementContext<'a> {
    pub repo_path: &'a str,
    pub target_branch: &'a str,
    pub working_branch: &'a str,
    pub files: &'a [String],
    pub assignment: Assignment<'a>,
}

pub fn implement(ctx: &ImplementContext<'_>) -> String {
    let task = match ctx.assignment {
        Assignment::Checklist(checklist) => format!(
            "Complete every item of this checklist (also available in `{}`):\n\n{}",
            TODO, checklist
        ),
        Assignment::Instruction(instruction) => format!(
            "A reviewer asked for the following change on this merge request:\n\n> {}",
            instruction.trim().replace('\n', "\n> ")
        ),
    };
    let files = if ctx.files.is_empty() {
        "(empty repository)".to_string()
    } else {
        ctx.files.join("\n")
    };
    format!(
        r#"## Task: implement changes

Repository: {repo}
Working branch: `{branch}` (will be merged into `{target}`)

{task}

Edit the files in the working tree directly. Alternatively, reply with a single
fenced ```diff block containing a unified diff relative to the repository root.
Do not commit, push or switch branches. Do not edit `{todo}`, `{plan}` or `{commit}`.

### Repository files (sample)

{files}
"#,
        repo = ctx.repo_path,
        branch = ctx.working_branch,
        target = ctx.target_branch,
        task = task,
        todo = TODO,
        plan = PLAN,
        commit = COMMIT_MSG,
        files = files,
    )
}

pub fn commit_message(changes: &ChangeSet, context: &str) -> String {
    let mut files: Vec<String> = Vec::new();
    files.extend(changes.modified.iter().map(|p| format!("M {}", p)));
    files.extend(changes.added.iter().map(|p| format!("A {}", p)));
    files.extend(changes.deleted.iter().map(|p| format!("D {}", p)));
    format!(
        r#"## Task: write a commit message

Reply with one line: an imperative commit subject of at most 72 characters.
No quotes, no body, no trailing period.

### Context

{context}

### Changed files

{files}
"#,
        context = context.trim(),
        files = files.join("\n"),
    )
}

pub fn review(
    mr_iid: u64,
    mr_title: Option<&str>,
    target: &str,
    source: &str,
    diff: &str,
    focus: Option<&str>,
) -> String {
    let diff = if diff.chars().count() > MAX_DIFF_CHARS {
        let kept: String = diff.chars().take(MAX_DIFF_CHARS).collect();
        format!("{}\n... (diff truncated)", kept)
    } else {
        diff.to_string()
    };
    let focus = focus
        .map(|f| format!("\nPay particular attention to: {}\n", f))
        .unwrap_or_default();
    format!(
        r#"## Task: review a merge request

Merge request !{iid}{title} merges `{source}` into `{target}`.
The source branch is checked out in the current directory. Do not modify any files except `{review}`.
{focus}
### Output

Write `{review}`, or reply with only a JSON array. One object per finding:

[{{"severity": "critical|major|minor|suggestion", "category": "security", "file": "path/in/repo", "line": 12, "title": "short title", "description": "what is wrong", "suggestion": "how to fix it"}}]

`line` is the 1-based line number in the new version of the file. Reply `[]` when there is nothing to report.

### Diff

```diff
{diff}
```
"#,
        iid = mr_iid,
        title = mr_title.map(|t| format!(" ({})", t)).unwrap_or_default(),
        source = source,
        target = target,
        review = REVIEW,
        focus = focus,
        diff = diff,
    )
}
