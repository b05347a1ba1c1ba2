use std::collections::BTreeMap;

use element_similarity::SimilarityScorer;
use heal_core_types::ElementProperties;
use proptest::prelude::*;

fn arb_element() -> impl Strategy<Value = ElementProperties> {
    let text = (
        prop::sample::select(vec!["button", "a", "input", "div", "span"]),
        "[a-c-]{0,6}",
        "[a-c ]{0,8}",
        "[A-Za-z ]{0,10}",
        "(btn|primary|link| ){0,4}",
    );
    let shape = (
        0.0f64..800.0,
        0.0f64..600.0,
        0.0f64..200.0,
        0.0f64..80.0,
        any::<bool>(),
        any::<bool>(),
    );
    let lists = (
        prop::collection::vec("[a-c]{1,4}", 0..3),
        prop::collection::btree_map("[a-c]{1,2}", "[x-z]{0,2}", 0..3),
    );
    (text, shape, lists).prop_map(
        |(
            (tag, id, name, visible_text, class_name),
            (x, y, width, height, is_button, with_geometry),
            (neighbor_texts, attributes),
        )| {
            let (x, y, width, height) = if with_geometry {
                (x, y, width, height)
            } else {
                (0.0, 0.0, 0.0, 0.0)
            };
            ElementProperties {
                tag: tag.to_string(),
                id,
                name,
                visible_text,
                class_name,
                x,
                y,
                width,
                height,
                is_button,
                neighbor_texts,
                attributes: attributes.into_iter().collect::<BTreeMap<_, _>>(),
                ..ElementProperties::default()
            }
        },
    )
}

proptest! {
    #[test]
    fn prop_score_is_symmetric(a in arb_element(), b in arb_element()) {
        let scorer = SimilarityScorer::default();
        let forward = scorer.score(&a, &b);
        let backward = scorer.score(&b, &a);
        prop_assert!((forward - backward).abs() < 1e-9, "{} vs {}", forward, backward);
    }

    #[test]
    fn prop_score_is_bounded(a in arb_element(), b in arb_element()) {
        let score = SimilarityScorer::default().score(&a, &b);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn prop_identity_scores_one(a in arb_element()) {
        // tag is always set, so at least one scored property is present
        let score = SimilarityScorer::default().score(&a, &a);
        prop_assert!((score - 1.0).abs() < 1e-9, "identity scored {}", score);
    }

    #[test]
    fn prop_ranking_is_sorted_and_stable(
        target in arb_element(),
        candidates in prop::collection::vec(arb_element(), 0..12),
    ) {
        let scorer = SimilarityScorer::default();
        let ranked = scorer.rank_candidates(&target, &candidates, candidates.len());
        prop_assert_eq!(ranked.len(), candidates.len());
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].index < pair[1].index);
            }
        }
    }
}
