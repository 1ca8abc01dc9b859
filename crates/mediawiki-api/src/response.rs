use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// The shapes the query endpoints answer with. The default format of
// the action API keys pages by their id rendered as a string and puts
// text payloads under a "*" member.

#[derive(Debug, Deserialize)]
pub(crate) struct PagesResponse {
    pub query: PagesPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PagesPayload {
    #[serde(default)]
    pub pages: BTreeMap<String, PageNode>,
    #[serde(default)]
    pub redirects: Vec<TitleMapping>,
    #[serde(default)]
    pub normalized: Vec<TitleMapping>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageNode {
    pub pageid: Option<u64>,
    pub title: Option<String>,
    pub fullurl: Option<String>,
    // Present (as an empty string) on pages that do not exist
    pub missing: Option<String>,
    #[serde(default)]
    pub pageprops: BTreeMap<String, String>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
    pub extract: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Revision {
    pub revid: Option<u64>,
    pub parentid: Option<u64>,
    #[serde(rename = "*")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TitleMapping {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub query: SearchPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchPayload {
    #[serde(default)]
    pub search: Vec<SearchHit>,
    pub searchinfo: Option<SearchInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchInfo {
    pub suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RandomResponse {
    pub query: RandomPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RandomPayload {
    #[serde(default)]
    pub random: Vec<RandomPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RandomPage {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SiteInfoResponse {
    pub query: SiteInfoPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SiteInfoPayload {
    #[serde(default)]
    pub languages: Vec<SiteLanguage>,
}

/// One language edition reported by the siteinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLanguage {
    pub code: String,
    /// The name of the language, in that language.
    #[serde(rename = "*")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryMembersResponse {
    pub query: CategoryMembersPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryMembersPayload {
    #[serde(default)]
    pub categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryMember {
    pub title: String,
}

// action=parse answers, requested with formatversion=2 where the
// payload is text.

#[derive(Debug, Deserialize)]
pub(crate) struct ParseResponse {
    pub parse: ParsePayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParsePayload {
    pub text: Option<String>,
    pub wikitext: Option<String>,
    #[serde(default)]
    pub sections: Vec<ParseSection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParseSection {
    pub line: String,
}

// Items gathered by the continued queries.

#[derive(Debug, Deserialize)]
pub(crate) struct ExternalLink {
    #[serde(rename = "*")]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkedTitle {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Backlink {
    pub pageid: Option<u64>,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImagePageNode {
    #[serde(default)]
    pub imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageInfo {
    pub url: String,
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{PagesResponse, Revision, SiteLanguage};

    #[test]
    fn pages_are_keyed_by_their_id() {
        let response: PagesResponse = serde_json::from_value(json!({
            "query": {
                "pages": {
                    "9228": {
                        "pageid": 9228,
                        "ns": 0,
                        "title": "Earth",
                        "fullurl": "https://en.wikipedia.org/wiki/Earth"
                    }
                }
            }
        }))
        .expect("Pages body does not decode");

        let node = response.query.pages.get("9228").expect("Page 9228 is absent");

        assert_eq!(node.pageid, Some(9228));
        assert_eq!(node.title.as_deref(), Some("Earth"));
        assert!(node.missing.is_none());
    }

    #[test]
    fn missing_pages_are_marked_with_an_empty_string() {
        let response: PagesResponse = serde_json::from_value(json!({
            "query": {
                "pages": {
                    "-1": { "ns": 0, "title": "Zzzyyqq", "missing": "" }
                }
            }
        }))
        .expect("Pages body does not decode");

        assert!(response.query.pages["-1"].missing.is_some());
    }

    #[test]
    fn star_members_decode() {
        let revision: Revision =
            serde_json::from_value(json!({ "revid": 42, "parentid": 41, "*": "text" }))
                .expect("Revision does not decode");

        assert_eq!(revision.content.as_deref(), Some("text"));

        let language: SiteLanguage =
            serde_json::from_value(json!({ "code": "no", "*": "norsk" }))
                .expect("Language does not decode");

        assert_eq!(language.name, "norsk");
    }
}
