//! Property-based tests for media parsing and equality

use fetchq::parser::{Media, MediaParser, ParserKind};
use proptest::prelude::*;

proptest! {
    // Equality is symmetric for any pair of parsed names.
    #[test]
    fn media_equality_is_symmetric(
        a in "[A-Za-z]{1,12}\\.S[0-9]{2}E[0-9]{2}",
        b in "[A-Za-z]{1,12}\\.S[0-9]{2}E[0-9]{2}",
    ) {
        let parser = MediaParser::new(ParserKind::Show);
        let ma = parser.parse(&a).unwrap();
        let mb = parser.parse(&b).unwrap();
        prop_assert_eq!(ma.equal(&mb), mb.equal(&ma));
    }

    // Empty media never compares equal, not even to itself.
    #[test]
    fn empty_media_equals_nothing(name in "[A-Za-z]{1,12}\\.S[0-9]{2}E[0-9]{2}") {
        let parser = MediaParser::new(ParserKind::Show);
        let parsed = parser.parse(&name).unwrap();
        let empty = Media::default();
        prop_assert!(!empty.equal(&empty));
        prop_assert!(!empty.equal(&parsed));
        prop_assert!(!parsed.equal(&empty));
    }

    // The show parser accepts any SxxEyy name and strips the episode tag.
    #[test]
    fn show_parser_extracts_season_and_episode(
        name in "[A-Z][a-z]{1,11}",
        season in 1u32..=99,
        episode in 1u32..=99,
    ) {
        let release = format!("{name}.S{season:02}E{episode:02}.720p");
        let parser = MediaParser::new(ParserKind::Show);
        let media = parser.parse(&release).unwrap();
        prop_assert_eq!(media.name.as_str(), name.as_str());
        prop_assert_eq!(media.season, season);
        prop_assert_eq!(media.episode, episode);
    }
}
