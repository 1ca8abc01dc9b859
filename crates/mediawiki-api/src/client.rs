use serde_json::from_value;

use crate::config::WikiClientConfig;
use crate::error::{Error, Result};
use crate::language::WikiLanguage;
use crate::page::{PageTarget, WikiPage};
use crate::response::{
    CategoryMembersResponse, RandomResponse, SearchResponse, SiteInfoResponse, SiteLanguage,
};
use crate::session::{Query, Session};

/// A client used for answering questions about one MediaWiki site.
pub struct WikiClient {
    config: WikiClientConfig,
    session: Session,
}

impl WikiClient {
    /// Create a [`WikiClient`] from a [`WikiClientConfig`]
    ///
    /// # Errors
    ///
    /// This method fails if the configured language has no iso 639-1
    /// code and no explicit api url was given
    pub fn from_config(config: WikiClientConfig) -> Result<Self> {
        let session = Session::new(&config)?;

        Ok(WikiClient { config, session })
    }

    pub fn language(&self) -> WikiLanguage {
        self.config.language
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    /// Titles of the pages matching a free text query, best match first.
    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<String>> {
        Ok(self.search_raw(query, limit, false)?.0)
    }

    /// Like [`Self::search`], but also reports the spelling the search
    /// backend would rather have been asked about.
    pub fn search_with_suggestion(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<(Vec<String>, Option<String>)> {
        self.search_raw(query, limit, true)
    }

    fn search_raw(
        &self,
        query: &str,
        limit: u32,
        with_suggestion: bool,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut request = Query::new()
            .param("list", "search")
            .param("srprop", "")
            .param("srlimit", limit)
            .param("srsearch", query);

        if with_suggestion {
            request = request.param("srinfo", "suggestion");
        }

        let response: SearchResponse = from_value(self.session.request_cached(&request)?)?;

        let titles = response
            .query
            .search
            .into_iter()
            .map(|hit| hit.title)
            .collect();
        let suggestion = response
            .query
            .searchinfo
            .and_then(|searchinfo| searchinfo.suggestion);

        Ok((titles, suggestion))
    }

    /// The spelling the search backend suggests for `query`, if any.
    pub fn suggest(&self, query: &str) -> Result<Option<String>> {
        let request = Query::new()
            .param("list", "search")
            .param("srinfo", "suggestion")
            .param("srprop", "")
            .param("srsearch", query);

        let response: SearchResponse = from_value(self.session.request_cached(&request)?)?;

        Ok(response
            .query
            .searchinfo
            .and_then(|searchinfo| searchinfo.suggestion))
    }

    /// Titles of `count` random pages from the article namespace.
    pub fn random(&self, count: u32) -> Result<Vec<String>> {
        let request = Query::new()
            .param("list", "random")
            .param("rnnamespace", 0)
            .param("rnlimit", count);

        let response: RandomResponse = from_value(self.session.request(&request)?)?;

        Ok(response
            .query
            .random
            .into_iter()
            .map(|page| page.title)
            .collect())
    }

    /// The languages the wiki family is published in, as code and
    /// native name pairs.
    pub fn languages(&self) -> Result<Vec<SiteLanguage>> {
        let request = Query::new()
            .param("meta", "siteinfo")
            .param("siprop", "languages");

        let response: SiteInfoResponse = from_value(self.session.request(&request)?)?;

        Ok(response.query.languages)
    }

    /// Titles of the members of a category, up to `limit` of them.
    pub fn category_members(
        &self,
        category: &CategorySelector,
        limit: u32,
        kind: CategoryMemberKind,
    ) -> Result<Vec<String>> {
        let request = Query::new()
            .param("list", "categorymembers")
            .param("cmlimit", limit)
            .param("cmtype", kind.as_str());

        let request = match category {
            CategorySelector::Title(title) => request.param("cmtitle", format!("Category:{title}")),
            CategorySelector::PageId(pageid) => request.param("cmpageid", pageid),
        };

        let response: CategoryMembersResponse = from_value(self.session.request(&request)?)?;

        Ok(response
            .query
            .categorymembers
            .into_iter()
            .map(|member| member.title)
            .collect())
    }

    /// Load the page best matching `title`.
    ///
    /// Lets the search backend correct the spelling first and follows
    /// redirects. Use [`Self::page_with`] to opt out of either.
    pub fn page(&self, title: &str) -> Result<WikiPage> {
        self.page_with(PageRequest::title(title))
    }

    /// Load the page with the given id.
    pub fn page_by_id(&self, pageid: u64) -> Result<WikiPage> {
        self.page_with(PageRequest::pageid(pageid))
    }

    pub fn page_with(&self, request: PageRequest) -> Result<WikiPage> {
        let PageRequest {
            target,
            auto_suggest,
            follow_redirects,
            preload,
        } = request;

        let target = match target {
            PageTarget::Title(title) if auto_suggest => {
                PageTarget::Title(self.closest_title(title)?)
            }
            target => target,
        };

        let page = WikiPage::fetch(self, &target, follow_redirects)?;

        if preload {
            page.preload(self)?;
        }

        Ok(page)
    }

    /// Pick the title the search backend considers closest to `title`.
    fn closest_title(&self, title: String) -> Result<String> {
        let (results, suggestion) = self.search_with_suggestion(title.as_str(), 1)?;

        let Some(resolved) = suggestion.or_else(|| results.into_iter().next()) else {
            return Err(Error::PageMissing { query: title });
        };

        if resolved != title {
            log::debug!("Resolved the title '{title}' to '{resolved}'");
        }

        Ok(resolved)
    }
}

impl Default for WikiClient {
    fn default() -> Self {
        Self::from_config(WikiClientConfig::default())
            .expect("Default client configuration is not valid")
    }
}

/// How the category whose members are listed is addressed.
#[derive(Clone, Debug)]
pub enum CategorySelector {
    /// The category title, without the `Category:` prefix.
    Title(String),
    PageId(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryMemberKind {
    Page,
    Subcategory,
    File,
}

impl CategoryMemberKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CategoryMemberKind::Page => "page",
            CategoryMemberKind::Subcategory => "subcat",
            CategoryMemberKind::File => "file",
        }
    }
}

/// What to load and how strictly, for [`WikiClient::page_with`].
#[derive(Clone, Debug)]
pub struct PageRequest {
    pub(crate) target: PageTarget,
    pub(crate) auto_suggest: bool,
    pub(crate) follow_redirects: bool,
    pub(crate) preload: bool,
}

impl PageRequest {
    pub fn title(title: impl Into<String>) -> Self {
        PageRequest {
            target: PageTarget::Title(title.into()),
            auto_suggest: true,
            follow_redirects: true,
            preload: false,
        }
    }

    pub fn pageid(pageid: u64) -> Self {
        PageRequest {
            target: PageTarget::PageId(pageid),
            auto_suggest: false,
            follow_redirects: true,
            preload: false,
        }
    }

    /// Let the search backend fix the spelling before the page is
    /// looked up. On by default for titles.
    pub fn auto_suggest(self, auto_suggest: bool) -> Self {
        Self {
            auto_suggest,
            ..self
        }
    }

    pub fn follow_redirects(self, follow_redirects: bool) -> Self {
        Self {
            follow_redirects,
            ..self
        }
    }

    /// Eagerly fetch content, summary, images, references, links and
    /// sections right after the page is resolved.
    pub fn preload(self, preload: bool) -> Self {
        Self { preload, ..self }
    }
}

#[cfg(test)]
mod test {
    use super::{CategoryMemberKind, PageRequest, WikiClient, WikiClientConfig};
    use crate::page::PageTarget;

    #[test]
    fn default_client_config_is_valid() {
        let config = WikiClientConfig::default();

        WikiClient::from_config(config).expect("Default configuration is invalid");
    }

    #[test]
    fn member_kinds_match_the_wire_words() {
        assert_eq!(CategoryMemberKind::Page.as_str(), "page");
        assert_eq!(CategoryMemberKind::Subcategory.as_str(), "subcat");
        assert_eq!(CategoryMemberKind::File.as_str(), "file");
    }

    #[test]
    fn title_requests_resolve_and_follow_by_default() {
        let request = PageRequest::title("Waffle");

        assert!(matches!(request.target, PageTarget::Title(ref title) if title == "Waffle"));
        assert!(request.auto_suggest);
        assert!(request.follow_redirects);
        assert!(!request.preload);
    }

    #[test]
    fn id_requests_have_nothing_to_suggest() {
        assert!(!PageRequest::pageid(9228).auto_suggest);
    }
}
