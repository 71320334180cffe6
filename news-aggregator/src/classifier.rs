use crate::traits::PlaceExtractor;
use crate::types::CanonicalItem;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const FALLBACK_CATEGORY: &str = "general";
const MAX_LOCATIONS: usize = 3;

/// Categories in declaration order. On equal scores the earlier category wins.
pub const CATEGORY_KEYWORDS: [(&str, &[&str]); 7] = [
    (
        "politics",
        &[
            "election", "government", "congress", "senate", "parliament", "president",
            "minister", "politics", "political", "vote", "voting", "campaign",
            "democracy", "republican", "democrat", "conservative", "liberal",
            "policy", "legislation", "law", "bill", "amendment", "constitution",
        ],
    ),
    (
        "sports",
        &[
            "football", "soccer", "basketball", "baseball", "tennis", "golf",
            "olympics", "championship", "tournament", "game", "match", "team",
            "player", "coach", "stadium", "league", "nfl", "nba", "nhl", "mlb",
            "fifa", "score", "win", "loss", "season", "playoffs",
        ],
    ),
    (
        "entertainment",
        &[
            "movie", "film", "actor", "actress", "director", "hollywood",
            "celebrity", "music", "album", "song", "concert", "artist",
            "tv", "television", "show", "series", "netflix", "streaming",
            "award", "oscar", "grammy", "emmy", "festival", "premiere",
        ],
    ),
    (
        "technology",
        &[
            "tech", "technology", "software", "app", "apple", "google",
            "microsoft", "amazon", "facebook", "twitter", "ai", "artificial",
            "intelligence", "robot", "automation", "startup", "innovation",
            "digital", "internet", "cyber", "data", "privacy", "security",
        ],
    ),
    (
        "business",
        &[
            "business", "economy", "economic", "market", "stock", "trade",
            "company", "corporation", "startup", "investment", "finance",
            "financial", "bank", "revenue", "profit", "merger", "acquisition",
        ],
    ),
    (
        "health",
        &[
            "health", "medical", "medicine", "doctor", "hospital", "disease",
            "virus", "vaccine", "covid", "pandemic", "treatment", "drug",
            "study", "research", "patient", "healthcare", "mental health",
        ],
    ),
    (
        "science",
        &[
            "science", "scientific", "research", "study", "discovery",
            "space", "nasa", "climate", "environment", "energy", "renewable",
            "carbon", "experiment", "university", "professor", "laboratory",
        ],
    ),
];

pub const MAJOR_CITIES: [&str; 47] = [
    "New York", "Los Angeles", "Chicago", "Houston", "Phoenix",
    "Philadelphia", "San Antonio", "San Diego", "Dallas", "San Jose",
    "London", "Paris", "Berlin", "Madrid", "Rome", "Amsterdam",
    "Tokyo", "Beijing", "Shanghai", "Mumbai", "Delhi", "Seoul",
    "Sydney", "Melbourne", "Toronto", "Vancouver", "Montreal",
    "Moscow", "St. Petersburg", "Kiev", "Warsaw", "Prague",
    "Stockholm", "Copenhagen", "Oslo", "Helsinki", "Dublin",
    "Brussels", "Vienna", "Zurich", "Geneva", "Barcelona",
    "Dubai", "Singapore", "Hong Kong", "Bangkok", "Jakarta",
];

const KNOWN_PLACES: &[&str] = &[
    // Countries and regions
    "Afghanistan", "Argentina", "Australia", "Austria", "Bangladesh", "Belgium",
    "Brazil", "Canada", "Chile", "China", "Colombia", "Cuba", "Denmark", "Egypt",
    "Ethiopia", "Europe", "Finland", "France", "Gaza", "Germany", "Greece",
    "Hungary", "India", "Indonesia", "Iran", "Iraq", "Ireland", "Israel", "Italy",
    "Japan", "Jordan", "Kenya", "Lebanon", "Malaysia", "Mexico", "Morocco",
    "Nepal", "Netherlands", "New Zealand", "Nigeria", "North Korea", "Norway",
    "Pakistan", "Peru", "Philippines", "Poland", "Portugal", "Qatar", "Russia",
    "Saudi Arabia", "South Africa", "South Korea", "Spain", "Sri Lanka", "Sudan",
    "Sweden", "Switzerland", "Syria", "Taiwan", "Thailand", "Turkey", "Ukraine",
    "United Kingdom", "United States", "Venezuela", "Vietnam", "Yemen",
    // US states
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado",
    "Connecticut", "Delaware", "Florida", "Georgia", "Hawaii", "Idaho",
    "Illinois", "Indiana", "Iowa", "Kansas", "Kentucky", "Louisiana", "Maine",
    "Maryland", "Massachusetts", "Michigan", "Minnesota", "Mississippi",
    "Missouri", "Montana", "Nebraska", "Nevada", "New Hampshire", "New Jersey",
    "New Mexico", "North Carolina", "North Dakota", "Ohio", "Oklahoma", "Oregon",
    "Pennsylvania", "Rhode Island", "South Carolina", "South Dakota", "Tennessee",
    "Texas", "Utah", "Vermont", "Virginia", "Washington", "West Virginia",
    "Wisconsin", "Wyoming",
];

fn word_pattern(phrase: &str, case_insensitive: bool) -> Regex {
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!(r"{}\b{}\b", flags, regex::escape(phrase))).unwrap()
}

static CATEGORY_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, keywords)| {
            (*category, keywords.iter().map(|k| word_pattern(k, true)).collect())
        })
        .collect()
});

static CITY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    MAJOR_CITIES.iter().map(|city| (*city, word_pattern(city, true))).collect()
});

static KNOWN_PLACE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    KNOWN_PLACES.iter().map(|place| (*place, word_pattern(place, false))).collect()
});

/// Default place extractor: capitalized country, region and US state names,
/// reported in the order they first appear in the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct KnownPlaceExtractor;

impl PlaceExtractor for KnownPlaceExtractor {
    fn extract_places(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &str)> = KNOWN_PLACE_PATTERNS
            .iter()
            .filter_map(|(place, re)| re.find(text).map(|m| (m.start(), *place)))
            .collect();
        hits.sort_by_key(|(pos, _)| *pos);
        hits.into_iter().map(|(_, place)| place.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub locations: Vec<String>,
}

pub struct Classifier {
    extractor: Arc<dyn PlaceExtractor>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(KnownPlaceExtractor))
    }
}

impl Classifier {
    pub fn new(extractor: Arc<dyn PlaceExtractor>) -> Self {
        Self { extractor }
    }

    pub fn classify(&self, item: &CanonicalItem) -> Classification {
        let text = format!("{} {}", item.title, item.description);
        Classification {
            category: categorize(&text).to_string(),
            locations: self.extract_locations(&text),
        }
    }

    /// Classify and fill in `category` and `locations`.
    pub fn apply(&self, mut item: CanonicalItem) -> CanonicalItem {
        let Classification { category, locations } = self.classify(&item);
        debug!("Classified {} as {} {:?}", item.id, category, locations);
        item.category = Some(category);
        item.locations = locations;
        item
    }

    pub fn classify_all(&self, items: Vec<CanonicalItem>) -> Vec<CanonicalItem> {
        items.into_iter().map(|item| self.apply(item)).collect()
    }

    /// Extractor results longer than two characters, then gazetteer cities not
    /// already present, capped at three.
    fn extract_locations(&self, text: &str) -> Vec<String> {
        let mut locations: Vec<String> = self
            .extractor
            .extract_places(text)
            .into_iter()
            .filter(|place| place.chars().count() > 2)
            .collect();

        for (city, re) in CITY_PATTERNS.iter() {
            if re.is_match(text) && !locations.iter().any(|l| l == city) {
                locations.push(city.to_string());
            }
        }

        locations.truncate(MAX_LOCATIONS);
        locations
    }
}

/// Highest keyword score wins; a tie keeps the earlier category, and no
/// matches at all yields `general`.
pub fn categorize(text: &str) -> &'static str {
    let mut best = (FALLBACK_CATEGORY, 0usize);
    for (category, patterns) in CATEGORY_PATTERNS.iter() {
        let score: usize = patterns.iter().map(|re| re.find_iter(text).count()).sum();
        if score > best.1 {
            best = (*category, score);
        }
    }
    best.0
}
