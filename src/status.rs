//! Worktree status classification and rendering.
//!
//! A status is a point-in-time snapshot derived from live git state plus the
//! `wt.createdAt` / `wt.initialCommit` metadata. State labels are mutually
//! exclusive with precedence `new` > `in_progress` > merged; `dirty` is an
//! independent tag that composes with any of them.

use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::git_utils::{GitOps, MergedSet};
use crate::worktree::ManagedWorktree;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeStatus {
    pub has_uncommitted_changes: bool,
    pub commits_ahead: usize,
    pub commits_behind: usize,
    pub is_merged: bool,
    /// PR references like `#123`; may be empty even when merged.
    pub merged_prs: Vec<String>,
    /// HEAD still sits on the commit recorded at creation.
    pub is_new: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// The single state label a status displays, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State<'a> {
    New,
    InProgress,
    Merged(&'a [String]),
}

impl State<'_> {
    pub fn label(&self) -> String {
        match self {
            State::New => "new".to_string(),
            State::InProgress => "in_progress".to_string(),
            State::Merged(prs) => format_merged(prs),
        }
    }

    /// Only unresolved work is emphasized.
    pub fn is_emphasized(&self) -> bool {
        matches!(self, State::InProgress)
    }
}

/// A rendered status tag with its emphasis flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub label: String,
    pub emphasized: bool,
}

impl Tag {
    fn render(&self) -> String {
        if self.emphasized {
            self.label.bold().to_string()
        } else {
            self.label.clone()
        }
    }
}

impl WorktreeStatus {
    pub fn state(&self) -> Option<State<'_>> {
        if self.is_new {
            Some(State::New)
        } else if self.commits_ahead > 0 && !self.is_merged {
            Some(State::InProgress)
        } else if self.is_merged && self.commits_ahead == 0 {
            Some(State::Merged(&self.merged_prs))
        } else {
            // ahead but merged: representable, nothing to say about it
            None
        }
    }

    /// State label followed by `dirty`, in display order.
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .state()
            .map(|state| Tag {
                label: state.label(),
                emphasized: state.is_emphasized(),
            })
            .into_iter()
            .collect();
        if self.has_uncommitted_changes {
            tags.push(Tag {
                label: "dirty".to_string(),
                emphasized: true,
            });
        }
        tags
    }

    /// Safe to remove: clean, not new, nothing ahead, and merged.
    pub fn is_cleanup_candidate(&self) -> bool {
        !self.has_uncommitted_changes && !self.is_new && self.commits_ahead == 0 && self.is_merged
    }
}

/// Classify `worktree` against `comparison_ref`.
///
/// `merged` is a precomputed merged-branch set; without it the branch is
/// queried on its own. Never fails: a worktree git still lists keeps a
/// status even when its directory is gone, and a failed dirty check reads
/// as clean.
pub fn compute(
    git: &dyn GitOps,
    worktree: &ManagedWorktree,
    comparison_ref: &str,
    merged: Option<&MergedSet>,
) -> WorktreeStatus {
    let has_uncommitted_changes = git.is_dirty(&worktree.path).unwrap_or_else(|e| {
        log::warn!("could not check {} for uncommitted changes: {e}", worktree.name);
        false
    });
    let branch = worktree.branch.as_str();

    let (commits_ahead, commits_behind) = git.ahead_behind(branch, comparison_ref);

    let is_merged = !branch.is_empty()
        && match merged {
            Some(set) => set.contains(branch),
            None => git.is_branch_merged(branch, comparison_ref),
        };
    let merged_prs = if is_merged {
        git.merge_prs(branch, comparison_ref)
    } else {
        Vec::new()
    };

    // worktrees created before metadata existed have no initial commit and are never new
    let is_new = match (git.initial_commit(&worktree.name), git.head_commit(&worktree.path)) {
        (Some(initial), Some(head)) => initial == head,
        _ => false,
    };

    WorktreeStatus {
        has_uncommitted_changes,
        commits_ahead,
        commits_behind,
        is_merged,
        merged_prs,
        is_new,
        created_at: git.created_at(&worktree.name),
    }
}

/// `merged`, or `merged in #1, #2` when PRs are known.
pub fn format_merged(prs: &[String]) -> String {
    if prs.is_empty() {
        "merged".to_string()
    } else {
        format!("merged in {}", prs.join(", "))
    }
}

/// One-line status: `↑N ↓M [state, dirty]`, omitting empty parts.
pub fn format_compact(status: &WorktreeStatus) -> String {
    let mut parts = Vec::new();
    if status.commits_ahead > 0 {
        parts.push(format!("↑{}", status.commits_ahead));
    }
    if status.commits_behind > 0 {
        parts.push(format!("↓{}", status.commits_behind));
    }
    let tags = status.tags();
    if !tags.is_empty() {
        let rendered: Vec<String> = tags.iter().map(Tag::render).collect();
        parts.push(format!("[{}]", rendered.join(", ")));
    }
    parts.join(" ")
}

/// Detail lines for the verbose listing (`Age`, `Ahead/Behind`, `Status`).
pub fn format_verbose(status: &WorktreeStatus, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(created) = status.created_at {
        lines.push(format!("Age: {}", format_age(now - created)));
    }
    if status.commits_ahead > 0 || status.commits_behind > 0 {
        lines.push(format!(
            "Ahead: {}  Behind: {}",
            count_commits(status.commits_ahead),
            count_commits(status.commits_behind)
        ));
    }
    let tags = status.tags();
    if !tags.is_empty() {
        let rendered: Vec<String> = tags.iter().map(Tag::render).collect();
        lines.push(format!("Status: {}", rendered.join(", ")));
    }
    lines
}

fn count_commits(n: usize) -> String {
    if n == 1 {
        "1 commit".to_string()
    } else {
        format!("{n} commits")
    }
}

/// Coarse human age: hours under a day, then days, then weeks.
pub fn format_age(age: Duration) -> String {
    let days = age.num_days();
    if days <= 0 {
        return match age.num_hours() {
            h if h <= 0 => "less than an hour".to_string(),
            1 => "1 hour".to_string(),
            h => format!("{h} hours"),
        };
    }
    match (days, days / 7) {
        (1, _) => "1 day".to_string(),
        (d, 0) => format!("{d} days"),
        (_, 1) => "1 week".to_string(),
        (_, w) => format!("{w} weeks"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_file, git, init_git_repo, FakeGit};
    use crate::git_utils::GitRepo;
    use std::path::PathBuf;

    fn plain() {
        colored::control::set_override(false);
    }

    fn status(new: bool, ahead: usize, merged: bool, dirty: bool) -> WorktreeStatus {
        WorktreeStatus {
            has_uncommitted_changes: dirty,
            commits_ahead: ahead,
            is_merged: merged,
            is_new: new,
            ..Default::default()
        }
    }

    #[test]
    fn new_wins_over_everything() {
        plain();
        for (ahead, merged) in [(0, false), (3, false), (0, true), (2, true)] {
            let s = status(true, ahead, merged, false);
            assert_eq!(s.state(), Some(State::New));
            let text = format_compact(&s);
            assert!(text.contains("[new]"), "{text}");
            assert!(!text.contains("in_progress") && !text.contains("merged"));
        }
    }

    #[test]
    fn in_progress_requires_unmerged_commits() {
        assert_eq!(status(false, 2, false, false).state(), Some(State::InProgress));
        assert_eq!(status(false, 0, false, false).state(), None);
    }

    #[test]
    fn merged_only_when_nothing_ahead() {
        plain();
        let merged = status(false, 0, true, false);
        assert!(matches!(merged.state(), Some(State::Merged(_))));
        assert_eq!(format_compact(&merged), "[merged]");

        let anomalous = status(false, 2, true, false);
        assert_eq!(anomalous.state(), None);
        assert_eq!(format_compact(&anomalous), "↑2");
    }

    #[test]
    fn dirty_composes_with_any_state() {
        plain();
        assert_eq!(format_compact(&status(true, 0, false, true)), "[new, dirty]");
        assert_eq!(format_compact(&status(false, 1, false, true)), "↑1 [in_progress, dirty]");
        assert_eq!(format_compact(&status(false, 0, true, true)), "[merged, dirty]");
        assert_eq!(format_compact(&status(false, 0, false, true)), "[dirty]");
    }

    #[test]
    fn emphasis_only_on_in_progress_and_dirty() {
        let tags = status(false, 1, false, true).tags();
        assert!(tags.iter().all(|t| t.emphasized));
        let tags = status(true, 0, false, false).tags();
        assert!(!tags[0].emphasized);
        let tags = status(false, 0, true, false).tags();
        assert!(!tags[0].emphasized);
    }

    #[test]
    fn compact_renders_counts_and_prs() {
        plain();
        let s = WorktreeStatus {
            commits_behind: 4,
            is_merged: true,
            merged_prs: vec!["#12".into(), "#15".into()],
            ..Default::default()
        };
        assert_eq!(format_compact(&s), "↓4 [merged in #12, #15]");
        assert_eq!(format_compact(&WorktreeStatus::default()), "");
    }

    #[test]
    fn verbose_lines_agree_with_compact() {
        plain();
        let now = Utc::now();
        let s = WorktreeStatus {
            commits_ahead: 1,
            commits_behind: 2,
            has_uncommitted_changes: true,
            created_at: Some(now - Duration::days(3)),
            ..Default::default()
        };
        assert_eq!(
            format_verbose(&s, now),
            vec![
                "Age: 3 days".to_string(),
                "Ahead: 1 commit  Behind: 2 commits".to_string(),
                "Status: in_progress, dirty".to_string(),
            ]
        );
    }

    #[test]
    fn cleanup_candidate_is_exact_conjunction() {
        let base = status(false, 0, true, false);
        assert!(base.is_cleanup_candidate());

        let mut dirty = base.clone();
        dirty.has_uncommitted_changes = true;
        assert!(!dirty.is_cleanup_candidate());

        let mut new = base.clone();
        new.is_new = true;
        assert!(!new.is_cleanup_candidate());

        let mut ahead = base.clone();
        ahead.commits_ahead = 1;
        assert!(!ahead.is_cleanup_candidate());

        let mut unmerged = base.clone();
        unmerged.is_merged = false;
        assert!(!unmerged.is_cleanup_candidate());
    }

    #[test]
    fn age_buckets() {
        assert_eq!(format_age(Duration::minutes(20)), "less than an hour");
        assert_eq!(format_age(Duration::minutes(70)), "1 hour");
        assert_eq!(format_age(Duration::hours(5)), "5 hours");
        assert_eq!(format_age(Duration::hours(30)), "1 day");
        assert_eq!(format_age(Duration::days(6)), "6 days");
        assert_eq!(format_age(Duration::days(8)), "1 week");
        assert_eq!(format_age(Duration::days(22)), "3 weeks");
    }

    fn managed(name: &str, branch: &str) -> ManagedWorktree {
        ManagedWorktree {
            name: name.to_string(),
            path: PathBuf::from(format!("/repo/worktrees/{name}")),
            branch: branch.to_string(),
            head: "abc".to_string(),
        }
    }

    #[test]
    fn compute_uses_cache_when_given() {
        let mut fake = FakeGit::new("/repo");
        fake.add_worktree_entry("feat", "/repo/worktrees/feat", "feat", "abc");
        fake.merge_subjects = vec!["Merge pull request #7 from acme/feat".to_string()];
        let cache: MergedSet = ["feat".to_string()].into_iter().collect();

        let s = compute(&fake, &managed("feat", "feat"), "main", Some(&cache));
        assert!(s.is_merged);
        assert_eq!(s.merged_prs, vec!["#7"]);
        assert_eq!(fake.merged_queries.get(), 0);

        let s = compute(&fake, &managed("feat", "feat"), "main", None);
        assert!(!s.is_merged);
        assert_eq!(fake.merged_queries.get(), 1);
    }

    #[test]
    fn compute_new_requires_recorded_initial_commit() {
        let mut fake = FakeGit::new("/repo");
        fake.add_worktree_entry("feat", "/repo/worktrees/feat", "feat", "abc");
        let wt = managed("feat", "feat");

        assert!(!compute(&fake, &wt, "main", None).is_new);
        fake.set_meta("feat", crate::git_utils::INITIAL_COMMIT_KEY, "abc");
        assert!(compute(&fake, &wt, "main", None).is_new);
        fake.set_meta("feat", crate::git_utils::INITIAL_COMMIT_KEY, "def");
        assert!(!compute(&fake, &wt, "main", None).is_new);
    }

    #[test]
    fn compute_detached_worktree_is_never_merged() {
        let mut fake = FakeGit::new("/repo");
        fake.add_worktree_entry("det", "/repo/worktrees/det", "", "abc");
        let cache: MergedSet = [String::new()].into_iter().collect();
        let s = compute(&fake, &managed("det", ""), "main", Some(&cache));
        assert!(!s.is_merged);
    }

    #[test]
    fn compute_against_real_repository() {
        let tmp = init_git_repo();
        let repo = GitRepo::discover(tmp.path()).unwrap();
        let root = repo.repo_root().to_path_buf();
        git(&root, &["worktree", "add", "-q", "-b", "feat", "worktrees/feat"]);
        let wt_path = root.join("worktrees/feat");
        let head = git(&wt_path, &["rev-parse", "HEAD"]);
        repo.set_initial_commit("feat", &head).unwrap();
        repo.set_created_at("feat", Utc::now()).unwrap();

        let wt = ManagedWorktree {
            name: "feat".into(),
            path: wt_path.clone(),
            branch: "feat".into(),
            head,
        };
        let fresh = compute(&repo, &wt, "main", None);
        assert!(fresh.is_new);
        assert!(fresh.created_at.is_some());
        assert!(!fresh.is_cleanup_candidate());

        commit_file(&wt_path, "work.txt", "x\n", "work");
        let worked = compute(&repo, &wt, "main", None);
        assert!(!worked.is_new);
        assert_eq!(worked.commits_ahead, 1);
        assert_eq!(worked.state(), Some(State::InProgress));

        git(&root, &["merge", "-q", "--no-ff", "--no-edit", "feat"]);
        let merged = compute(&repo, &wt, "main", None);
        assert_eq!(merged.commits_ahead, 0);
        assert!(merged.is_merged);
        assert!(merged.is_cleanup_candidate());
    }

    #[test]
    fn compute_survives_missing_worktree_directory() {
        let tmp = init_git_repo();
        let repo = GitRepo::discover(tmp.path()).unwrap();
        let root = repo.repo_root().to_path_buf();
        git(&root, &["worktree", "add", "-q", "-b", "gone", "worktrees/gone"]);
        let wt_path = root.join("worktrees/gone");
        commit_file(&wt_path, "work.txt", "x\n", "work");
        std::fs::remove_dir_all(&wt_path).unwrap();

        let wt = ManagedWorktree {
            name: "gone".into(),
            path: wt_path,
            branch: "gone".into(),
            head: String::new(),
        };
        let status = compute(&repo, &wt, "main", None);
        assert!(!status.has_uncommitted_changes);
        assert_eq!(status.commits_ahead, 1);
        assert_eq!(status.state(), Some(State::InProgress));
    }
}
