//! Built-in rule configuration, seeded on first run.

use serde_json::Value;

use crate::model::{
    Condition, ConditionGroup, ConditionNode, ConditionType, GroupOperator, Rule, RuleConfig,
};

fn cond(kind: ConditionType, field: &str, value: Option<Value>) -> ConditionNode {
    ConditionNode::Leaf(Condition {
        kind,
        field: field.to_string(),
        value,
    })
}

fn all_of(conditions: Vec<ConditionNode>) -> ConditionGroup {
    ConditionGroup {
        operator: GroupOperator::And,
        conditions,
    }
}

/// The configuration used until the user saves their own.
pub fn default_config() -> RuleConfig {
    RuleConfig {
        version: 1,
        rules: vec![
            Rule {
                id: "builtin-tv".to_string(),
                name: "TV episodes".to_string(),
                description: "Video files carrying season and episode numbers".to_string(),
                enabled: true,
                priority: 100,
                conditions: all_of(vec![
                    cond(ConditionType::Equals, "fileType", Some("video".into())),
                    cond(ConditionType::Exists, "season", None),
                    cond(ConditionType::Exists, "episode", None),
                ]),
                template: "TV Shows/{titles.eng|title}/S{season:pad2}/{titles.eng|title} \
                           S{season:pad2}E{episode:pad2}.{extension}"
                    .to_string(),
                fallback_to_unsorted: true,
            },
            Rule {
                id: "builtin-movie".to_string(),
                name: "Movies".to_string(),
                description: "Video files without episode structure".to_string(),
                enabled: true,
                priority: 50,
                conditions: all_of(vec![
                    cond(ConditionType::Equals, "fileType", Some("video".into())),
                    cond(ConditionType::NotExists, "season", None),
                    cond(ConditionType::Exists, "title", None),
                ]),
                template: "Movies/{title} ({movieYear|year})/{title} ({movieYear|year}).{extension}"
                    .to_string(),
                fallback_to_unsorted: false,
            },
            Rule {
                id: "builtin-subtitle".to_string(),
                name: "Subtitles".to_string(),
                description: "Subtitle files, grouped by title".to_string(),
                enabled: true,
                priority: 40,
                conditions: all_of(vec![cond(
                    ConditionType::Equals,
                    "fileType",
                    Some("subtitle".into()),
                )]),
                template: "Subtitles/{title|fileName}{subtitleLanguage?(.{subtitleLanguage})}.{extension}"
                    .to_string(),
                fallback_to_unsorted: false,
            },
        ],
        default_rule: Some(Rule {
            id: "builtin-unsorted".to_string(),
            name: "Unsorted".to_string(),
            description: "Everything no other rule claims".to_string(),
            enabled: true,
            priority: 0,
            conditions: ConditionGroup::default(),
            template: "Unsorted/{fileName}".to_string(),
            fallback_to_unsorted: true,
        }),
        last_modified: None,
        is_default: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleSet;
    use metafuse_core::{FileMetadata, PropertyMap};

    fn meta(pairs: &[(&str, &str)]) -> FileMetadata {
        let map: PropertyMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FileMetadata::from_properties(&map).unwrap()
    }

    #[test]
    fn test_defaults_mark_is_default() {
        let config = default_config();
        assert!(config.is_default);
        assert!(config.last_modified.is_none());
    }

    #[test]
    fn test_movie_placement() {
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[
            ("filePath", "Movies/Inception.mkv"),
            ("title", "Inception"),
            ("fileType", "video"),
            ("extension", "mkv"),
            ("movieYear", "2010"),
        ]));
        assert_eq!(resolved.path, "Movies/Inception (2010)/Inception (2010).mkv");
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-movie"));
    }

    #[test]
    fn test_tv_placement() {
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[
            ("filePath", "tv/bb/s01e01.mkv"),
            ("titles.eng", "Breaking Bad"),
            ("season", "1"),
            ("episode", "1"),
            ("fileType", "video"),
            ("extension", "mkv"),
        ]));
        assert_eq!(
            resolved.path,
            "TV Shows/Breaking Bad/S01/Breaking Bad S01E01.mkv"
        );
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-tv"));
    }

    #[test]
    fn test_season_zero_hits_tv_rule() {
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[
            ("filePath", "tv/bb/s00e01.mkv"),
            ("title", "Breaking Bad"),
            ("season", "0"),
            ("episode", "1"),
            ("fileType", "video"),
            ("extension", "mkv"),
        ]));
        assert_eq!(
            resolved.path,
            "TV Shows/Breaking Bad/S00/Breaking Bad S00E01.mkv"
        );
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-tv"));
    }

    #[test]
    fn test_subtitle_placement() {
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[
            ("filePath", "sub/inception.srt"),
            ("title", "Inception"),
            ("fileType", "subtitle"),
            ("subtitleLanguage", "eng"),
        ]));
        assert_eq!(resolved.path, "Subtitles/Inception.eng.srt");
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-subtitle"));
    }

    #[test]
    fn test_unknown_file_lands_unsorted() {
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[("filePath", "misc/readme.txt")]));
        assert_eq!(resolved.path, "Unsorted/readme.txt");
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-unsorted"));
    }

    #[test]
    fn test_tv_missing_title_falls_back_unsorted() {
        // Conditions match (season+episode exist) but the title is missing
        // everywhere; the TV rule's fallbackToUnsorted catches it.
        let set = RuleSet::compile(&default_config());
        let resolved = set.resolve(&meta(&[
            ("filePath", "tv/unknown/s01e01.mkv"),
            ("season", "1"),
            ("episode", "1"),
            ("fileType", "video"),
        ]));
        assert_eq!(resolved.path, "Unsorted/s01e01.mkv");
        assert_eq!(resolved.rule_id.as_deref(), Some("builtin-tv"));
    }
}
