//! Translation of provider genres to DVB content categories.
//!
//! Provider genres are free-form Dutch keywords. Most TV software only
//! understands the ETSI EN 300 468 content descriptor names (as used by
//! TVHeadend), so each known keyword maps to a DVB category with a
//! precedence:
//!
//! - [`Mapping::Direct`] is always applied.
//! - [`Mapping::Group`] is applied when no direct keyword hit the same group.
//! - [`Mapping::Only`] is applied when nothing else matched in any group.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Precedence of a keyword mapping. Lower variants win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mapping {
    /// Always applied.
    Direct,
    /// Applied if the group has no direct match.
    Group,
    /// Applied only if nothing else matched at all.
    Only,
}

use Mapping::{Direct, Group, Only};

type CategoryTable = &'static [(&'static str, &'static [(&'static str, Mapping)])];

/// DVB content groups with their categories and the provider keywords mapped to them.
static ETSI_TABLE: &[(&str, CategoryTable)] = &[
    (
        "Movie/Drama",
        &[
            (
                "movie/drama",
                &[
                    ("actie", Group),
                    ("drama", Direct),
                    ("dramaseries", Direct),
                    ("film", Direct),
                    ("miniseries", Group),
                    ("misdaaddrama", Direct),
                ],
            ),
            ("detective/thriller", &[("thriller", Direct), ("mysterie", Direct)]),
            (
                "adventure/western/war",
                &[("avontuur", Direct), ("oorlog", Group), ("western", Direct)],
            ),
            (
                "science fiction/fantasy/horror",
                &[("fantasy", Direct), ("horror", Direct), ("sciencefiction", Direct)],
            ),
            (
                "comedy",
                &[
                    ("komedie", Direct),
                    ("romantische komedie", Direct),
                    ("sitcoms", Direct),
                    ("zwarte komedie", Direct),
                ],
            ),
            ("soap/melodrama/folkloric", &[("soap", Direct)]),
            ("romance", &[("romantiek", Direct)]),
            (
                "serious/classical/religious/historical movie/drama",
                &[("historisch drama", Direct)],
            ),
        ],
    ),
    (
        "News/Current affairs",
        &[
            (
                "news/current affairs",
                &[
                    ("actualiteit", Direct),
                    ("actualiteitenprogramma's", Direct),
                    ("misdaad", Only),
                ],
            ),
            ("news/weather report", &[("nieuws", Direct), ("weer", Direct)]),
            ("documentary", &[("documentaire", Direct)]),
            (
                "discussion/interview/debate",
                &[("debat", Direct), ("interview", Direct)],
            ),
        ],
    ),
    (
        "Show/Game show",
        &[
            (
                "show/game show",
                &[
                    ("awards", Direct),
                    ("entertainment", Only),
                    ("event", Only),
                    ("standup komedie", Direct),
                    ("veiling", Direct),
                ],
            ),
            (
                "game show/quiz/contest",
                &[("reality-competitie", Direct), ("spelshow", Direct)],
            ),
            ("variety show", &[("variété", Direct)]),
            ("talk show", &[("sporttalkshow", Direct), ("talkshow", Direct)]),
        ],
    ),
    (
        "Sports",
        &[
            (
                "sports",
                &[
                    ("extreme sporten", Direct),
                    ("sport", Direct),
                    ("golf", Direct),
                    ("stierenvechten", Direct),
                    ("vliegsport", Direct),
                    ("wielrennen", Direct),
                ],
            ),
            (
                "special events (olympic games, world cup, etc.)",
                &[("multisportevenement", Direct), ("olympische spelen", Direct)],
            ),
            (
                "football/soccer",
                &[("american football", Direct), ("voetbal", Direct)],
            ),
            ("tennis/squash", &[("tennis", Direct)]),
            (
                "team sports (excluding football)",
                &[("rugby", Direct), ("rugby league", Direct)],
            ),
            ("motor sport", &[("motorsport", Direct)]),
            ("water sport", &[("duiken", Direct), ("varen", Direct)]),
            ("winter sports", &[("skiën", Direct)]),
        ],
    ),
    (
        "Children's/Youth programmes",
        &[
            (
                "children's / youth programs",
                &[("kids en familie", Direct), ("kinderen", Direct)],
            ),
            ("cartoons/puppets", &[("animatie", Direct), ("anime", Direct)]),
        ],
    ),
    (
        "Music/Ballet/Dance",
        &[
            ("music/ballet/dance", &[("muziek", Direct)]),
            ("musical/opera", &[("musical", Direct), ("opera", Direct)]),
            ("ballet", &[("ballet", Direct)]),
        ],
    ),
    (
        "Arts/Culture (without music)",
        &[
            (
                "arts/culture (without music)",
                &[
                    ("beeldende kunst", Direct),
                    ("bloemlezing", Direct),
                    ("kunstnijverheid", Direct),
                ],
            ),
            (
                "performing arts",
                &[
                    ("cheerleading", Direct),
                    ("dans", Direct),
                    ("podiumkunsten", Direct),
                    ("theater", Direct),
                ],
            ),
            ("religion", &[("religie", Direct)]),
            ("literature", &[("boeken & literatuur", Direct)]),
            ("fashion", &[("mode", Direct)]),
        ],
    ),
    (
        "Social/Political issues/Economics",
        &[
            (
                "social/political issues/economics",
                &[
                    ("business & financial", Direct),
                    ("consumentenprogramma's", Only),
                    ("goede doelen", Direct),
                    ("lhbti", Direct),
                    ("opvoeden", Direct),
                    ("politiek", Direct),
                    ("politieke satire", Direct),
                    ("recht", Direct),
                    ("samenleving", Direct),
                ],
            ),
            (
                "magazines/reports/documentary",
                &[("docudrama", Direct), ("docusoap", Direct), ("paranormaal", Direct)],
            ),
            ("economics/social advisory", &[("zelfhulp", Direct)]),
        ],
    ),
    (
        "Education/Science/Factual topics",
        &[
            (
                "education/science/factual topics",
                &[
                    ("amerikaanse geschiedenis", Direct),
                    ("biografie", Direct),
                    ("educatie", Direct),
                    ("geschiedenis", Direct),
                    ("klassieke geschiedenis", Direct),
                    ("militair", Only),
                    ("reality", Only),
                    ("verzamelen", Only),
                    ("wereldgeschiedenis", Direct),
                    ("wetenschap", Direct),
                ],
            ),
            (
                "nature/animals/environment",
                &[
                    ("dieren", Direct),
                    ("landbouw", Direct),
                    ("natuur", Direct),
                    ("natuur en milieu", Direct),
                ],
            ),
            (
                "technology/natural sciences",
                &[("computers", Direct), ("technologie", Direct)],
            ),
            ("medicine/physiology/psychology", &[("medisch", Direct)]),
        ],
    ),
    (
        "Leisure hobbies",
        &[
            (
                "leisure hobbies",
                &[
                    ("fietsen", Direct),
                    ("gamen", Direct),
                    ("outdoor", Direct),
                    ("vissen", Direct),
                ],
            ),
            ("tourism/travel", &[("reizen", Direct)]),
            (
                "handicraft",
                &[("bouwen en verbouwen", Direct), ("doe-het-zelf", Direct)],
            ),
            ("motoring", &[("auto's", Direct), ("motors", Direct)]),
            (
                "fitness and health",
                &[
                    ("exercise", Direct),
                    ("fit en gezond", Direct),
                    ("gezondheid", Direct),
                ],
            ),
            ("cooking", &[("culinair", Direct)]),
            ("gardening", &[("home & garden", Direct)]),
        ],
    ),
];

#[derive(Clone, Copy, Debug)]
struct Descriptor {
    group: &'static str,
    category: &'static str,
    mapping: Mapping,
}

static LOOKUP: LazyLock<HashMap<&'static str, Descriptor>> = LazyLock::new(|| {
    let mut lookup = HashMap::new();
    for &(group, categories) in ETSI_TABLE {
        for &(category, keywords) in categories {
            for &(keyword, mapping) in keywords {
                lookup.insert(
                    keyword,
                    Descriptor {
                        group,
                        category,
                        mapping,
                    },
                );
            }
        }
    }
    lookup
});

/// Translates provider genres into DVB category names.
///
/// Unknown genres are ignored, so the result may be shorter than the input
/// or empty. Output order follows the first appearance of each group and
/// category in `genres`.
#[must_use]
pub fn dvb_categories<S: AsRef<str>>(genres: &[S]) -> Vec<&'static str> {
    // group -> [(category, strongest mapping)], insertion ordered
    let mut groups: Vec<(&str, Vec<(&'static str, Mapping)>)> = Vec::new();

    for genre in genres {
        let key = genre.as_ref().trim().to_lowercase();
        let Some(descriptor) = LOOKUP.get(key.as_str()) else {
            continue;
        };

        let index = match groups.iter().position(|(g, _)| *g == descriptor.group) {
            Some(index) => index,
            None => {
                groups.push((descriptor.group, Vec::new()));
                groups.len() - 1
            }
        };
        let categories = &mut groups[index].1;

        match categories.iter_mut().find(|(c, _)| *c == descriptor.category) {
            Some((_, mapping)) => *mapping = (*mapping).min(descriptor.mapping),
            None => categories.push((descriptor.category, descriptor.mapping)),
        }
    }

    let mut result = Vec::new();
    for (_, categories) in &groups {
        let picked = |wanted: Mapping| {
            categories
                .iter()
                .filter(move |(_, m)| *m == wanted)
                .map(|(c, _)| *c)
        };

        let direct: Vec<_> = picked(Direct).collect();
        if direct.is_empty() {
            result.extend(picked(Group));
        } else {
            result.extend(direct);
        }
    }

    if result.is_empty() {
        result = groups
            .iter()
            .flat_map(|(_, categories)| categories.iter().map(|(c, _)| *c))
            .collect();
    }

    result
}
