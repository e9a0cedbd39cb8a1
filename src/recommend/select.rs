//! Decides what to show and how to phrase it.
//!
//! Everything here is a pure function of the model and an environment
//! snapshot. Nothing touches storage or prompts the user.

use std::collections::BTreeMap;

use crate::host::Environment;
use crate::storage::{Recommendation, RecommendationModel};

/// A target ready to be shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub target_id: String,
    pub display_name: String,
    pub recommenders: Vec<Recommender>,
}

/// One installed extension recommending a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommender {
    pub source_id: String,
    pub name: String,
    pub description: String,
}

impl Candidate {
    pub fn recommender_count(&self) -> usize {
        self.recommenders.len()
    }

    /// Prompt text: single-source phrasing with the reason, or a list of
    /// every recommender.
    pub fn message(&self) -> String {
        match self.recommenders.as_slice() {
            [only] => single_source_message(&only.name, &self.display_name, &only.description),
            many => {
                let names: Vec<&str> = many.iter().map(|r| r.name.as_str()).collect();
                multi_source_message(&names, &self.display_name)
            }
        }
    }

    /// Per-recommender reasons, one per line.
    pub fn details(&self) -> String {
        self.recommenders
            .iter()
            .map(|r| format!("{}: {}", r.name, r.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Targets due in the startup pass, in first-appearance order.
///
/// A target qualifies when it is not installed and not timelocked, and at
/// least one startup entry for it comes from an installed source and has
/// not been ignored.
pub fn startup_candidates(model: &RecommendationModel, env: &dyn Environment) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for target_id in model.target_ids() {
        if env.is_installed(target_id) || model.is_timelocked(target_id) {
            continue;
        }

        let entries: Vec<&Recommendation> = model
            .for_target(target_id)
            .filter(|r| r.should_show_on_startup && env.is_installed(&r.source_id))
            .collect();

        if entries.is_empty() || entries.iter().all(|r| r.user_ignored) {
            continue;
        }

        let names: Vec<&str> = entries
            .iter()
            .map(|r| r.extension_display_name.as_str())
            .collect();
        let display_name = display_name_mode(&names).unwrap_or_else(|| target_id.to_string());

        let mut recommenders: Vec<Recommender> = Vec::with_capacity(entries.len());
        for entry in entries {
            if recommenders.iter().any(|r| r.source_id == entry.source_id) {
                continue;
            }
            recommenders.push(recommender_for(entry, env));
        }

        candidates.push(Candidate {
            target_id: target_id.to_string(),
            display_name,
            recommenders,
        });
    }

    candidates
}

/// The exact `from -> to` recommendation, if it should be shown now.
///
/// Requires `from` installed, `to` not installed, and the record present
/// and not ignored. `description` replaces the stored reason when given.
pub fn on_demand_candidate(
    model: &RecommendationModel,
    env: &dyn Environment,
    from: &str,
    to: &str,
    description: Option<&str>,
) -> Option<Candidate> {
    if !env.is_installed(from) || env.is_installed(to) {
        return None;
    }

    let record = model.find(from, to)?;
    if record.user_ignored {
        return None;
    }

    let mut recommender = recommender_for(record, env);
    if let Some(description) = description {
        recommender.description = description.to_string();
    }

    Some(Candidate {
        target_id: to.to_string(),
        display_name: record.extension_display_name.clone(),
        recommenders: vec![recommender],
    })
}

/// Most frequent display name.
///
/// Ties go to the lexicographically greatest name, so the result is the
/// same for any input order. `None` for an empty list.
pub fn display_name_mode(names: &[&str]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(*name).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (name, count) in counts {
        // Ascending key order with `>=` lets later names win ties.
        if best.map_or(true, |(_, best_count)| count >= best_count) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string())
}

pub fn single_source_message(recommender: &str, display_name: &str, description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("{recommender} recommends the \"{display_name}\" extension.")
    } else {
        format!("{recommender} recommends the \"{display_name}\" extension: {description}")
    }
}

pub fn multi_source_message(recommenders: &[&str], display_name: &str) -> String {
    format!(
        "{} recommend the \"{display_name}\" extension.",
        join_names(recommenders)
    )
}

/// `A`, `A and B`, `A, B and C`.
pub fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn recommender_for(entry: &Recommendation, env: &dyn Environment) -> Recommender {
    Recommender {
        source_id: entry.source_id.clone(),
        name: env
            .installed_display_name(&entry.source_id)
            .unwrap_or_else(|| entry.source_id.clone()),
        description: entry.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticEnvironment;

    fn model_with(recs: Vec<Recommendation>) -> RecommendationModel {
        let mut model = RecommendationModel::new("s1");
        model.recommendations = recs;
        model
    }

    fn env_with(installed: &[(&str, &str)]) -> StaticEnvironment {
        let env = StaticEnvironment::new("s1");
        for (id, name) in installed {
            env.install(*id, *name);
        }
        env
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&[]), "");
        assert_eq!(join_names(&["A"]), "A");
        assert_eq!(join_names(&["A", "B"]), "A and B");
        assert_eq!(join_names(&["A", "B", "C"]), "A, B and C");
    }

    #[test]
    fn test_display_name_mode_majority() {
        assert_eq!(
            display_name_mode(&["Bee", "Bee2", "Bee"]).as_deref(),
            Some("Bee")
        );
    }

    #[test]
    fn test_display_name_mode_tie_prefers_greatest() {
        assert_eq!(display_name_mode(&["Bee", "Bee2"]).as_deref(), Some("Bee2"));
        assert_eq!(display_name_mode(&["Bee2", "Bee"]).as_deref(), Some("Bee2"));
    }

    #[test]
    fn test_display_name_mode_empty() {
        assert!(display_name_mode(&[]).is_none());
    }

    #[test]
    fn test_single_source_message() {
        assert_eq!(
            single_source_message("Alpha", "Bee", "It helps"),
            "Alpha recommends the \"Bee\" extension: It helps"
        );
        assert_eq!(
            single_source_message("Alpha", "Bee", "  "),
            "Alpha recommends the \"Bee\" extension."
        );
    }

    #[test]
    fn test_multi_source_message() {
        assert_eq!(
            multi_source_message(&["Alpha", "Charlie", "Delta"], "Bee"),
            "Alpha, Charlie and Delta recommend the \"Bee\" extension."
        );
    }

    #[test]
    fn test_startup_skips_installed_target() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "d", true)]);
        let env = env_with(&[("a", "Alpha"), ("b", "Bee")]);
        assert!(startup_candidates(&model, &env).is_empty());
    }

    #[test]
    fn test_startup_excludes_uninstalled_sources() {
        let model = model_with(vec![
            Recommendation::new("a", "b", "Bee", "d1", true),
            Recommendation::new("c", "b", "Bee", "d2", true),
        ]);
        let env = env_with(&[("a", "Alpha")]);

        let candidates = startup_candidates(&model, &env);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recommender_count(), 1);
        assert_eq!(candidates[0].recommenders[0].name, "Alpha");
        assert_eq!(
            candidates[0].message(),
            "Alpha recommends the \"Bee\" extension: d1"
        );
    }

    #[test]
    fn test_startup_skips_when_no_installed_source() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "d1", true)]);
        let env = env_with(&[]);
        assert!(startup_candidates(&model, &env).is_empty());
    }

    #[test]
    fn test_startup_skips_fully_ignored_target() {
        let mut first = Recommendation::new("a", "b", "Bee", "d1", true);
        let mut second = Recommendation::new("c", "b", "Bee", "d2", true);
        first.user_ignored = true;
        second.user_ignored = true;
        let model = model_with(vec![first, second]);
        let env = env_with(&[("a", "Alpha"), ("c", "Charlie")]);

        assert!(startup_candidates(&model, &env).is_empty());
    }

    #[test]
    fn test_startup_shows_partially_ignored_target() {
        let mut first = Recommendation::new("a", "b", "Bee", "d1", true);
        first.user_ignored = true;
        let model = model_with(vec![first, Recommendation::new("c", "b", "Bee", "d2", true)]);
        let env = env_with(&[("a", "Alpha"), ("c", "Charlie")]);

        let candidates = startup_candidates(&model, &env);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recommender_count(), 2);
    }

    #[test]
    fn test_startup_skips_entries_not_flagged_for_startup() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "d", false)]);
        let env = env_with(&[("a", "Alpha")]);
        assert!(startup_candidates(&model, &env).is_empty());
    }

    #[test]
    fn test_startup_skips_timelocked_target() {
        let mut model = model_with(vec![Recommendation::new("a", "b", "Bee", "d", true)]);
        model.timelocked.push("b".to_string());
        let env = env_with(&[("a", "Alpha")]);
        assert!(startup_candidates(&model, &env).is_empty());
    }

    #[test]
    fn test_startup_multi_source_candidate() {
        let model = model_with(vec![
            Recommendation::new("a", "b", "Bee", "d1", true),
            Recommendation::new("c", "b", "Bee2", "d2", true),
            Recommendation::new("a", "x", "Ex", "d3", true),
        ]);
        let env = env_with(&[("a", "Alpha"), ("c", "Charlie")]);

        let candidates = startup_candidates(&model, &env);
        let targets: Vec<_> = candidates.iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(targets, vec!["b", "x"]);

        let bee = &candidates[0];
        assert_eq!(bee.display_name, "Bee2");
        assert_eq!(
            bee.message(),
            "Alpha and Charlie recommend the \"Bee2\" extension."
        );
        assert_eq!(bee.details(), "Alpha: d1\nCharlie: d2");
    }

    #[test]
    fn test_recommender_name_falls_back_to_id() {
        let env = StaticEnvironment::new("s1");
        let rec = Recommendation::new("unknown.src", "b", "Bee", "d", true);
        assert_eq!(recommender_for(&rec, &env).name, "unknown.src");

        env.install("unknown.src", "Known Now");
        assert_eq!(recommender_for(&rec, &env).name, "Known Now");
    }

    #[test]
    fn test_on_demand_requires_installed_state() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "d", false)]);

        let env = env_with(&[]);
        assert!(on_demand_candidate(&model, &env, "a", "b", None).is_none());

        let env = env_with(&[("a", "Alpha"), ("b", "Bee")]);
        assert!(on_demand_candidate(&model, &env, "a", "b", None).is_none());

        let env = env_with(&[("a", "Alpha")]);
        let candidate = on_demand_candidate(&model, &env, "a", "b", None)
            .expect("Should produce a candidate");
        assert_eq!(candidate.message(), "Alpha recommends the \"Bee\" extension: d");
    }

    #[test]
    fn test_on_demand_missing_record() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "d", false)]);
        let env = env_with(&[("a", "Alpha")]);
        assert!(on_demand_candidate(&model, &env, "a", "zzz", None).is_none());
    }

    #[test]
    fn test_on_demand_description_override() {
        let model = model_with(vec![Recommendation::new("a", "b", "Bee", "stored", false)]);
        let env = env_with(&[("a", "Alpha")]);

        let candidate = on_demand_candidate(&model, &env, "a", "b", Some("right now"))
            .expect("Should produce a candidate");
        assert_eq!(
            candidate.message(),
            "Alpha recommends the \"Bee\" extension: right now"
        );
    }

    #[test]
    fn test_on_demand_respects_user_ignored() {
        let mut rec = Recommendation::new("a", "b", "Bee", "d", false);
        rec.user_ignored = true;
        let model = model_with(vec![rec]);
        let env = env_with(&[("a", "Alpha")]);
        assert!(on_demand_candidate(&model, &env, "a", "b", None).is_none());
    }
}
