use super::types::DateOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Text,
    CaseId,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct Keyword {
    pub name: &'static str,
    pub path: &'static str,
    pub kind: KeywordKind,
}

const fn keyword(name: &'static str, path: &'static str, kind: KeywordKind) -> Keyword {
    Keyword { name, path, kind }
}

/// Recognized search keywords, in the order filters are emitted.
pub const KEYWORDS: &[Keyword] = &[
    keyword("gender", "demographics.gender", KeywordKind::Text),
    keyword("occupation", "demographics.occupation", KeywordKind::Text),
    keyword("country", "location.countryISO3", KeywordKind::Text),
    keyword("place", "location.place", KeywordKind::Text),
    keyword("location", "location.location", KeywordKind::Text),
    keyword("outcome", "events.outcome", KeywordKind::Text),
    keyword(
        "lastModifiedBy",
        "revisionMetadata.updateMetadata.curator",
        KeywordKind::Text,
    ),
    keyword("caseId", "_id", KeywordKind::CaseId),
    keyword("sourceUrl", "caseReference.sourceUrl", KeywordKind::Text),
    keyword("dateConfirmedFrom", "events.dateEntry", KeywordKind::Date),
    keyword("dateConfirmedTo", "events.dateEntry", KeywordKind::Date),
    keyword(
        "dateModifiedFrom",
        "revisionMetadata.updateMetadata.date",
        KeywordKind::Date,
    ),
    keyword(
        "dateModifiedTo",
        "revisionMetadata.updateMetadata.date",
        KeywordKind::Date,
    ),
];

/// Case-sensitive lookup.
pub fn find_keyword(name: &str) -> Option<usize> {
    KEYWORDS.iter().position(|k| k.name == name)
}

pub fn date_operator(name: &str) -> Option<DateOperator> {
    match name {
        "dateConfirmedFrom" | "dateModifiedFrom" => Some(DateOperator::GreaterOrEqual),
        "dateConfirmedTo" | "dateModifiedTo" => Some(DateOperator::LessThan),
        _ => None,
    }
}
