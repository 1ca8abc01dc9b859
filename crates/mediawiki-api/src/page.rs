use itertools::Itertools;
use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde_json::{Map, Value, from_value};
use url::Url;

use crate::client::WikiClient;
use crate::error::{Error, Result};
use crate::response::{
    Backlink, ExternalLink, ImagePageNode, LinkedTitle, PageNode, PagesResponse, ParsePayload,
    ParseResponse,
};
use crate::session::Query;

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<li([^>]*)>(.*?)</li>").expect("Failed to compile the list item regex")
});

static ANCHOR_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*\stitle="([^"]+)""#).expect("Failed to compile the anchor title regex")
});

static NUMERIC_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#([0-9]+|[xX][0-9a-fA-F]+);")
        .expect("Failed to compile the numeric reference regex")
});

/// How a page is addressed before its identity is known.
#[derive(Clone, Debug)]
pub(crate) enum PageTarget {
    Title(String),
    PageId(u64),
}

impl PageTarget {
    fn describe(&self) -> String {
        match self {
            PageTarget::Title(title) => title.clone(),
            PageTarget::PageId(pageid) => format!("pageid {pageid}"),
        }
    }
}

/// One page, resolved to its canonical identity.
///
/// Everything beyond the identity is fetched on first use and kept for
/// the lifetime of the value, so repeated accessor calls cost one
/// request at most.
#[derive(Clone, Debug)]
pub struct WikiPage {
    pageid: u64,
    title: String,
    url: Url,
    requested_title: Option<String>,
    disambiguation: Vec<String>,

    content: OnceCell<String>,
    summary: OnceCell<String>,
    html: OnceCell<String>,
    wikitext: OnceCell<String>,
    revision_id: OnceCell<u64>,
    parent_id: OnceCell<u64>,
    references: OnceCell<Vec<String>>,
    links: OnceCell<Vec<String>>,
    backlinks: OnceCell<Vec<String>>,
    backlink_ids: OnceCell<Vec<u64>>,
    categories: OnceCell<Vec<String>>,
    images: OnceCell<Vec<String>>,
    sections: OnceCell<Vec<String>>,
}

impl PartialEq for WikiPage {
    fn eq(&self, other: &Self) -> bool {
        self.pageid == other.pageid && self.title == other.title && self.url == other.url
    }
}

impl Eq for WikiPage {}

/// What the continued queries gather their items from.
enum Continued {
    /// A property array on the requested page
    PageProp(&'static str),
    /// A site wide list next to the pages
    List(&'static str),
    /// The pages produced by a generator
    Pages,
}

impl WikiPage {
    fn bare(
        pageid: u64,
        title: String,
        url: Url,
        requested_title: Option<String>,
        disambiguation: Vec<String>,
    ) -> Self {
        WikiPage {
            pageid,
            title,
            url,
            requested_title,
            disambiguation,
            content: OnceCell::new(),
            summary: OnceCell::new(),
            html: OnceCell::new(),
            wikitext: OnceCell::new(),
            revision_id: OnceCell::new(),
            parent_id: OnceCell::new(),
            references: OnceCell::new(),
            links: OnceCell::new(),
            backlinks: OnceCell::new(),
            backlink_ids: OnceCell::new(),
            categories: OnceCell::new(),
            images: OnceCell::new(),
            sections: OnceCell::new(),
        }
    }

    pub(crate) fn fetch(
        client: &WikiClient,
        target: &PageTarget,
        follow_redirects: bool,
    ) -> Result<Self> {
        let query = Query::new()
            .param("prop", "info|pageprops")
            .param("inprop", "url")
            .param("redirects", "");

        let query = match target {
            PageTarget::Title(title) => query.param("titles", title),
            PageTarget::PageId(pageid) => query.param("pageids", pageid),
        };

        let response: PagesResponse = from_value(client.session().request(&query)?)?;
        let payload = response.query;

        let node = payload
            .pages
            .into_values()
            .next()
            .ok_or_else(|| Error::malformed("page lookup answered without pages"))?;

        if node.missing.is_some() {
            return Err(Error::PageMissing {
                query: target.describe(),
            });
        }

        if let Some(redirect) = payload.redirects.first() {
            if !follow_redirects {
                return Err(Error::Redirected {
                    from: redirect.from.clone(),
                    to: redirect.to.clone(),
                });
            }

            log::debug!(
                "Followed the redirect from '{}' to '{}'",
                redirect.from,
                redirect.to
            );
        }

        if let Some(normalized) = payload.normalized.first() {
            log::debug!(
                "Normalized the title '{}' to '{}'",
                normalized.from,
                normalized.to
            );
        }

        let pageid = node
            .pageid
            .ok_or_else(|| Error::malformed("page entry without a pageid"))?;
        let title = node
            .title
            .ok_or_else(|| Error::malformed("page entry without a title"))?;
        let url = node
            .fullurl
            .as_deref()
            .and_then(|fullurl| Url::parse(fullurl).ok())
            .ok_or_else(|| Error::malformed("page entry without a usable fullurl"))?;

        if let Some(last) = payload.redirects.last() {
            if last.to != title {
                log::warn!("Redirects reported by the API do not settle on '{title}'");
            }
        }

        let disambiguation = if node.pageprops.contains_key("disambiguation") {
            Self::disambiguation_targets(client, pageid)?
        } else {
            Vec::new()
        };

        let requested_title = match target {
            PageTarget::Title(requested) => Some(requested.clone()),
            PageTarget::PageId(_) => None,
        };

        Ok(Self::bare(pageid, title, url, requested_title, disambiguation))
    }

    pub fn pageid(&self) -> u64 {
        self.pageid
    }

    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The title the page was asked for under, before normalization
    /// and redirects. `None` for pages loaded by id.
    pub fn requested_title(&self) -> Option<&str> {
        self.requested_title.as_deref()
    }

    pub fn is_disambiguation(&self) -> bool {
        !self.disambiguation.is_empty()
    }

    /// The titles a disambiguation page offers. Empty for articles.
    pub fn disambiguation_options(&self) -> &[String] {
        self.disambiguation.as_slice()
    }

    /// Plain text of the whole page.
    pub fn content(&self, client: &WikiClient) -> Result<&str> {
        self.content
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("prop", "extracts|revisions")
                    .param("explaintext", "")
                    .param("rvprop", "ids")
                    .param("titles", self.title.as_str());

                let response: PagesResponse = from_value(client.session().request(&query)?)?;
                let node = self.own_node(response)?;

                if let Some(revision) = node.revisions.first() {
                    if let Some(revid) = revision.revid {
                        let _ = self.revision_id.set(revid);
                    }
                    if let Some(parentid) = revision.parentid {
                        let _ = self.parent_id.set(parentid);
                    }
                }

                node.extract
                    .ok_or_else(|| Error::malformed("extract absent from content answer"))
            })
            .map(String::as_str)
    }

    /// Plain text of the paragraphs before the first section heading.
    pub fn summary(&self, client: &WikiClient) -> Result<&str> {
        self.summary
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("prop", "extracts")
                    .param("explaintext", "")
                    .param("exintro", "")
                    .param("titles", self.title.as_str());

                let response: PagesResponse = from_value(client.session().request(&query)?)?;

                self.own_node(response)?
                    .extract
                    .ok_or_else(|| Error::malformed("extract absent from summary answer"))
            })
            .map(String::as_str)
    }

    /// Id of the newest revision. Fetched together with [`Self::content`].
    pub fn revision_id(&self, client: &WikiClient) -> Result<u64> {
        if let Some(revision_id) = self.revision_id.get() {
            return Ok(*revision_id);
        }

        self.content(client)?;

        self.revision_id
            .get()
            .copied()
            .ok_or_else(|| Error::malformed("revision ids absent from content answer"))
    }

    /// Id of the revision the newest one was made on top of.
    pub fn parent_id(&self, client: &WikiClient) -> Result<u64> {
        if let Some(parent_id) = self.parent_id.get() {
            return Ok(*parent_id);
        }

        self.content(client)?;

        self.parent_id
            .get()
            .copied()
            .ok_or_else(|| Error::malformed("revision ids absent from content answer"))
    }

    /// The page rendered to HTML.
    pub fn html(&self, client: &WikiClient) -> Result<&str> {
        self.html
            .get_or_try_init(|| self.parse_property(client, "text", |parse| parse.text))
            .map(String::as_str)
    }

    /// The wikitext source of the page.
    pub fn wikitext(&self, client: &WikiClient) -> Result<&str> {
        self.wikitext
            .get_or_try_init(|| self.parse_property(client, "wikitext", |parse| parse.wikitext))
            .map(String::as_str)
    }

    /// Section headings, in document order.
    pub fn sections(&self, client: &WikiClient) -> Result<&[String]> {
        self.sections
            .get_or_try_init(|| {
                let query = Query::action("parse")
                    .param("page", self.title.as_str())
                    .param("prop", "sections");

                let response: ParseResponse = from_value(client.session().request(&query)?)?;

                Ok(response
                    .parse
                    .sections
                    .into_iter()
                    .map(|section| section.line)
                    .collect())
            })
            .map(Vec::as_slice)
    }

    /// Plain text of the section titled `heading`, or `None` when the
    /// page has no such section. Subsection text is not included.
    pub fn section(&self, client: &WikiClient, heading: &str) -> Result<Option<String>> {
        let content = self.content(client)?;
        let marker = format!("== {heading} ==");

        let Some(found) = content.find(marker.as_str()) else {
            return Ok(None);
        };

        let body = &content[found + marker.len()..];
        let body = body.find("==").map_or(body, |next| &body[..next]);

        Ok(Some(body.trim_start_matches('=').trim().to_owned()))
    }

    /// URLs of the external references, with protocol relative links
    /// pinned to http.
    pub fn references(&self, client: &WikiClient) -> Result<&[String]> {
        self.references
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("prop", "extlinks")
                    .param("ellimit", "max")
                    .param("titles", self.title.as_str());

                self.continued_query(client, query, &Continued::PageProp("extlinks"))?
                    .into_iter()
                    .map(|item| {
                        let link: ExternalLink = from_value(item)?;
                        Ok(ensure_protocol(link.url.as_str()))
                    })
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// Titles of the articles the page links to.
    pub fn links(&self, client: &WikiClient) -> Result<&[String]> {
        self.links
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("prop", "links")
                    .param("plnamespace", 0)
                    .param("pllimit", "max")
                    .param("titles", self.title.as_str());

                self.continued_query(client, query, &Continued::PageProp("links"))?
                    .into_iter()
                    .map(|item| Ok(from_value::<LinkedTitle>(item)?.title))
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// Titles of the pages that link here.
    pub fn backlinks(&self, client: &WikiClient) -> Result<&[String]> {
        self.backlinks
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("list", "backlinks")
                    .param("bllimit", "max")
                    .param("bltitle", self.title.as_str());

                let items = self.continued_query(client, query, &Continued::List("backlinks"))?;

                let mut titles = Vec::with_capacity(items.len());
                let mut pageids = Vec::with_capacity(items.len());

                for item in items {
                    let backlink: Backlink = from_value(item)?;

                    if let Some(pageid) = backlink.pageid {
                        pageids.push(pageid);
                    }

                    titles.push(backlink.title);
                }

                let _ = self.backlink_ids.set(pageids);

                Ok(titles)
            })
            .map(Vec::as_slice)
    }

    /// Ids of the pages that link here. Fetched together with
    /// [`Self::backlinks`].
    pub fn backlink_ids(&self, client: &WikiClient) -> Result<&[u64]> {
        if let Some(backlink_ids) = self.backlink_ids.get() {
            return Ok(backlink_ids.as_slice());
        }

        self.backlinks(client)?;

        self.backlink_ids
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| Error::malformed("backlink ids were not gathered"))
    }

    /// Titles of the page's categories, without the namespace prefix.
    pub fn categories(&self, client: &WikiClient) -> Result<&[String]> {
        self.categories
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("prop", "categories")
                    .param("cllimit", "max")
                    .param("titles", self.title.as_str());

                self.continued_query(client, query, &Continued::PageProp("categories"))?
                    .into_iter()
                    .map(|item| {
                        let category: LinkedTitle = from_value(item)?;
                        Ok(strip_category_prefix(category.title))
                    })
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// URLs of the files embedded in the page.
    pub fn images(&self, client: &WikiClient) -> Result<&[String]> {
        self.images
            .get_or_try_init(|| {
                let query = Query::new()
                    .param("generator", "images")
                    .param("gimlimit", "max")
                    .param("prop", "imageinfo")
                    .param("iiprop", "url")
                    .param("titles", self.title.as_str());

                let pages = self.continued_query(client, query, &Continued::Pages)?;

                let mut urls = Vec::new();

                for page in pages {
                    let node: ImagePageNode = from_value(page)?;

                    if let Some(info) = node.imageinfo.into_iter().next() {
                        urls.push(info.url);
                    }
                }

                Ok(urls.into_iter().unique().collect())
            })
            .map(Vec::as_slice)
    }

    /// Fetch content, summary, images, references, links and sections
    /// in one go. The remaining properties stay lazy.
    pub fn preload(&self, client: &WikiClient) -> Result<()> {
        self.content(client)?;
        self.summary(client)?;
        self.images(client)?;
        self.references(client)?;
        self.links(client)?;
        self.sections(client)?;

        Ok(())
    }

    fn parse_property(
        &self,
        client: &WikiClient,
        prop: &str,
        pick: impl FnOnce(ParsePayload) -> Option<String>,
    ) -> Result<String> {
        let query = Query::action("parse")
            .param("page", self.title.as_str())
            .param("prop", prop)
            .param("formatversion", 2);

        let response: ParseResponse = from_value(client.session().request(&query)?)?;

        pick(response.parse)
            .ok_or_else(|| Error::malformed("parse answer without the requested property"))
    }

    fn own_node(&self, mut response: PagesResponse) -> Result<PageNode> {
        response
            .query
            .pages
            .remove(self.pageid.to_string().as_str())
            .ok_or_else(|| Error::malformed("answer does not cover the requested page"))
    }

    /// Run `base` repeatedly, carrying the continuation parameters the
    /// API hands back, and gather the items of every batch.
    fn continued_query(
        &self,
        client: &WikiClient,
        base: Query,
        source: &Continued,
    ) -> Result<Vec<Value>> {
        let mut gathered = Vec::new();
        let mut carry: Vec<(String, String)> = Vec::new();
        let mut last_window = 0;

        loop {
            let mut query = base.clone();

            for (name, value) in &carry {
                query = query.param(name.clone(), value);
            }

            let response = client.session().request(&query)?;

            let Some(payload) = response.get("query") else {
                break;
            };

            let window = payload
                .get("pages")
                .and_then(Value::as_object)
                .map_or(0, Map::len);

            let next = response
                .get("continue")
                .and_then(Value::as_object)
                .map(continue_params);

            // A stalled server repeats the continuation token without
            // changing the size of the page window. A repeated token
            // next to a differently sized window still carries data.
            if let Some(next) = &next {
                if !carry.is_empty() && *next == carry && window == last_window {
                    log::warn!("Continued query for '{}' stalled", self.title);
                    break;
                }
            }

            match source {
                Continued::PageProp(prop) => {
                    if let Some(items) = payload
                        .get("pages")
                        .and_then(|pages| pages.get(self.pageid.to_string().as_str()))
                        .and_then(|page| page.get(prop))
                        .and_then(Value::as_array)
                    {
                        gathered.extend(items.iter().cloned());
                    }
                }
                Continued::List(list) => {
                    if let Some(items) = payload.get(list).and_then(Value::as_array) {
                        gathered.extend(items.iter().cloned());
                    }
                }
                Continued::Pages => {
                    if let Some(pages) = payload.get("pages").and_then(Value::as_object) {
                        gathered.extend(pages.values().cloned());
                    }
                }
            }

            last_window = window;

            match next {
                Some(next) => carry = next,
                None => break,
            }
        }

        Ok(gathered)
    }

    fn disambiguation_targets(client: &WikiClient, pageid: u64) -> Result<Vec<String>> {
        let query = Query::new()
            .param("prop", "revisions")
            .param("rvprop", "content")
            .param("rvparse", "")
            .param("rvlimit", 1)
            .param("pageids", pageid);

        let response: PagesResponse = from_value(client.session().request(&query)?)?;

        let node = response
            .query
            .pages
            .into_values()
            .next()
            .ok_or_else(|| Error::malformed("disambiguation lookup answered without pages"))?;

        let html = node
            .revisions
            .into_iter()
            .next()
            .and_then(|revision| revision.content)
            .ok_or_else(|| Error::malformed("revision content absent from disambiguation answer"))?;

        Ok(targets_from_html(html.as_str()))
    }
}

fn continue_params(continuation: &Map<String, Value>) -> Vec<(String, String)> {
    continuation
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };

            (name.clone(), value)
        })
        .collect()
}

/// Titles linked from the item lists of a rendered disambiguation page.
fn targets_from_html(html: &str) -> Vec<String> {
    LIST_ITEM
        .captures_iter(html)
        .filter(|capture| !capture[1].contains("tocsection"))
        .filter_map(|capture| {
            ANCHOR_TITLE
                .captures(&capture[2])
                .map(|anchor| unescape_html(&anchor[1]))
        })
        .unique()
        .collect()
}

// MediaWiki escapes titles with numeric references as well, like
// `&#039;` for an apostrophe. `&amp;` has to go last, a double
// escaped ampersand must not turn into a fresh entity.
fn unescape_html(text: &str) -> String {
    let text = NUMERIC_REFERENCE.replace_all(text, |reference: &Captures| {
        let body = &reference[1];

        let code = match body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
            Some(digits) => u32::from_str_radix(digits, 16),
            None => body.parse(),
        };

        code.ok()
            .and_then(char::from_u32)
            .map_or_else(|| reference[0].to_owned(), String::from)
    });

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

// The API reports protocol relative references as '//host/path'
fn ensure_protocol(url: &str) -> String {
    if url.starts_with("http") {
        url.to_owned()
    } else {
        format!("http:{url}")
    }
}

fn strip_category_prefix(title: String) -> String {
    title
        .strip_prefix("Category:")
        .map(str::to_owned)
        .unwrap_or(title)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::{WikiPage, ensure_protocol, strip_category_prefix, targets_from_html, unescape_html};
    use crate::client::WikiClient;

    fn page_with_content(content: &str) -> WikiPage {
        let page = WikiPage::bare(
            1,
            "Test".to_owned(),
            Url::parse("https://en.wikipedia.org/wiki/Test").expect("Test url is invalid"),
            None,
            Vec::new(),
        );

        page.content
            .set(content.to_owned())
            .expect("Content cell is fresh");

        page
    }

    #[test]
    fn protocol_relative_references_are_pinned() {
        assert_eq!(ensure_protocol("//doi.org/10.1000/1"), "http://doi.org/10.1000/1");
        assert_eq!(ensure_protocol("https://doi.org/10.1000/1"), "https://doi.org/10.1000/1");
    }

    #[test]
    fn category_prefixes_are_stripped() {
        assert_eq!(strip_category_prefix("Category:Berries".to_owned()), "Berries");
        assert_eq!(strip_category_prefix("Berries".to_owned()), "Berries");
    }

    #[test]
    fn disambiguation_targets_skip_the_toc() {
        let html = concat!(
            "<ul><li class=\"toclevel-1 tocsection-1\"><a href=\"#See_also\">See also</a></li></ul>",
            "<ul>",
            "<li><a href=\"/wiki/Mercury_(element)\" title=\"Mercury (element)\">Mercury (element)</a>, a metal</li>\n",
            "<li><a href=\"/wiki/Mercury_(planet)\" title=\"Mercury (planet)\">Mercury (planet)</a></li>\n",
            "<li>Roman god: <a href=\"/wiki/Mercury_(mythology)\" title=\"Mercury (mythology)\">Mercury (mythology)</a></li>",
            "</ul>",
        );

        assert_eq!(
            targets_from_html(html),
            vec!["Mercury (element)", "Mercury (planet)", "Mercury (mythology)"]
        );
    }

    #[test]
    fn duplicate_targets_are_listed_once() {
        let html = concat!(
            "<li><a href=\"/wiki/Amber\" title=\"Amber\">Amber</a></li>",
            "<li><a href=\"/wiki/Amber\" title=\"Amber\">the resin</a></li>",
        );

        assert_eq!(targets_from_html(html), vec!["Amber"]);
    }

    #[test]
    fn entities_in_titles_are_unescaped() {
        assert_eq!(unescape_html("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(unescape_html("&quot;A&quot; &#39;B&#39; &lt;C&gt;"), "\"A\" 'B' <C>");
    }

    #[test]
    fn numeric_references_decode_to_their_character() {
        assert_eq!(unescape_html("L&#039;H&#244;pital&#039;s rule"), "L'Hôpital's rule");
        assert_eq!(unescape_html("&#x48;&#X101;"), "H\u{101}");
        // Past the last code point, the reference stays as written.
        assert_eq!(unescape_html("&#1114112;"), "&#1114112;");
        assert_eq!(unescape_html("Tom &amp;#039;s"), "Tom &#039;s");
    }

    #[test]
    fn apostrophe_titles_survive_the_anchor_extraction() {
        let html = concat!(
            "<li><a href=\"/wiki/L%27Anse\" title=\"L&#039;Anse\">L&#039;Anse</a>",
            ", a village in Michigan</li>",
        );

        assert_eq!(targets_from_html(html), vec!["L'Anse"]);
    }

    #[test]
    fn sections_are_sliced_out_of_content() {
        let page = page_with_content(
            "Intro.\n\n== History ==\nOld times.\n\n== Geography ==\nMostly flat.",
        );
        let client = WikiClient::default();

        assert_eq!(
            page.section(&client, "History").expect("Section lookup failed"),
            Some("Old times.".to_owned())
        );
        assert_eq!(
            page.section(&client, "Geography").expect("Section lookup failed"),
            Some("Mostly flat.".to_owned())
        );
        assert_eq!(
            page.section(&client, "Culture").expect("Section lookup failed"),
            None
        );
    }

    #[test]
    fn subsection_markers_are_trimmed() {
        let page = page_with_content("== A ==\nText.\n\n=== A one ===\nMore.");
        let client = WikiClient::default();

        assert_eq!(
            page.section(&client, "A").expect("Section lookup failed"),
            Some("Text.".to_owned())
        );
        assert_eq!(
            page.section(&client, "A one").expect("Section lookup failed"),
            Some("More.".to_owned())
        );
    }

    #[test]
    fn pages_compare_by_identity() {
        let left = page_with_content("Some text");
        let right = WikiPage::bare(
            1,
            "Test".to_owned(),
            Url::parse("https://en.wikipedia.org/wiki/Test").expect("Test url is invalid"),
            Some("test".to_owned()),
            Vec::new(),
        );

        assert_eq!(left, right);
    }
}
