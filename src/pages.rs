use crate::config::Config;

/// Which remote source and local route prefix a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    /// Encyclopedia pages, served under `/wikiPage`.
    Wiki,
    /// Dictionary pages, served under `/dicoPage`.
    Dico,
}

impl Namespace {
    pub fn route_name(self) -> &'static str {
        match self {
            Namespace::Wiki => "wikiPage",
            Namespace::Dico => "dicoPage",
        }
    }

    pub fn route_prefix(self) -> &'static str {
        match self {
            Namespace::Wiki => "/wikiPage",
            Namespace::Dico => "/dicoPage",
        }
    }

    pub fn from_route(segment: &str) -> Option<Self> {
        match segment {
            "wikiPage" => Some(Namespace::Wiki),
            "dicoPage" => Some(Namespace::Dico),
            _ => None,
        }
    }

    pub fn host(self, config: &Config) -> &str {
        match self {
            Namespace::Wiki => &config.wiki_host,
            Namespace::Dico => &config.dico_host,
        }
    }
}

/// Strips any namespace prefix from a covert or final page reference and
/// lowercases it, leaving a bare page title.
pub fn clean_page_ref(raw: &str) -> String {
    raw.to_lowercase()
        .replace("/wikipage/", "")
        .replace("/dicopage/", "")
        .replace("dicopage/", "")
        .replace("wikipage/", "")
}

/// Namespace a covert or final page reference points into. Encyclopedia is
/// the default when no prefix is present.
pub fn ref_namespace(raw: &str) -> Namespace {
    if raw.to_lowercase().contains("dicopage") {
        Namespace::Dico
    } else {
        Namespace::Wiki
    }
}
