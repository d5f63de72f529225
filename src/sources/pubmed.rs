//! PubMed source adapter using the NCBI E-utilities API.
//!
//! Searches go through `esearch.fcgi` (JSON, offset pagination) and metadata
//! through `efetch.fcgi` (PubMed XML, up to [`EFETCH_MAX_IDS`] ids per call).

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use super::{CrawlerError, Page, SourceAdapter};
use crate::config::CrawlerConfig;
use crate::models::{ItemMetadata, ItemMetadataBuilder, SearchQuery, SourceType};
use crate::utils::{ApiRequest, Payload};

/// PubMed E-utilities API base URL
const PUBMED_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

const DEFAULT_PAGE_SIZE: usize = 100;
/// esearch rejects larger `retmax` values
const MAX_PAGE_SIZE: usize = 10_000;
/// Ids per efetch request
pub const EFETCH_MAX_IDS: usize = 200;

const DATE_FORMAT: &str = "%Y/%m/%d";
const OPEN_FROM_DATE: &str = "1800/01/01";
const OPEN_TO_DATE: &str = "3000/12/31";

/// Pagination state for esearch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedCursor {
    /// Offset of the next page
    pub retstart: usize,
}

/// PubMed adapter
///
/// Every request carries the `tool` parameter, plus `email` and `api_key`
/// when configured; NCBI grants identified clients higher rate limits.
#[derive(Debug, Clone)]
pub struct PubMedAdapter {
    tool: String,
    email: Option<String>,
    api_key: Option<String>,
    page_size: usize,
}

impl PubMedAdapter {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            email: None,
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Adapter with the identification parameters from `config`
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            tool: config.tool_name.clone(),
            email: config.contact_email.clone(),
            api_key: config.api_key.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the esearch page size (clamped to 1..=10000)
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn with_auth(&self, request: ApiRequest) -> ApiRequest {
        request
            .param("tool", &self.tool)
            .param_opt("email", self.email.as_deref())
            .param_opt("api_key", self.api_key.as_deref())
    }

    /// Build the esearch term, embedding any date range as a `[PDAT]` clause
    fn search_term(query: &SearchQuery) -> Result<String, CrawlerError> {
        let text = query.query.trim();
        if !query.has_date_filter() {
            if text.is_empty() {
                return Err(CrawlerError::InvalidRequest("empty search query".to_string()));
            }
            return Ok(text.to_string());
        }

        let from = validate_date(query.from_date.as_deref())?.unwrap_or(OPEN_FROM_DATE);
        let to = validate_date(query.to_date.as_deref())?.unwrap_or(OPEN_TO_DATE);
        let range = format!("{}:{}[PDAT]", from, to);

        if text.is_empty() {
            Ok(range)
        } else {
            Ok(format!("({}) AND ({})", text, range))
        }
    }
}

fn validate_date(date: Option<&str>) -> Result<Option<&str>, CrawlerError> {
    match date {
        None => Ok(None),
        Some(date) => NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map(|_| Some(date))
            .map_err(|_| {
                CrawlerError::InvalidRequest(format!(
                    "invalid PubMed date '{}', expected YYYY/MM/DD",
                    date
                ))
            }),
    }
}

#[derive(Debug, Deserialize)]
struct ESearchEnvelope {
    esearchresult: Option<ESearchResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    count: Option<Count>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// esearch reports counts as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(usize),
    Text(String),
}

impl Count {
    fn value(&self) -> Result<usize, CrawlerError> {
        match self {
            Count::Number(n) => Ok(*n),
            Count::Text(s) => s.trim().parse().map_err(|_| {
                CrawlerError::MalformedResponse(format!("invalid esearch count '{}'", s))
            }),
        }
    }
}

impl SourceAdapter for PubMedAdapter {
    type Cursor = PubMedCursor;

    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn source_type(&self) -> SourceType {
        SourceType::PubMed
    }

    fn default_base_url(&self) -> &str {
        PUBMED_BASE_URL
    }

    fn build_search_request(
        &self,
        query: &SearchQuery,
        cursor: &PubMedCursor,
    ) -> Result<ApiRequest, CrawlerError> {
        let term = Self::search_term(query)?;
        let retmax = match query.max_results {
            Some(max) if max > 0 => self.page_size.min(max),
            _ => self.page_size,
        };

        Ok(self.with_auth(
            ApiRequest::json("esearch.fcgi")
                .param("db", "pubmed")
                .param("term", term)
                .param("retmax", retmax)
                .param("retstart", cursor.retstart)
                .param("retmode", "json"),
        ))
    }

    fn extract_ids(
        &self,
        payload: &Payload,
        cursor: &PubMedCursor,
    ) -> Result<Page<PubMedCursor>, CrawlerError> {
        let envelope: ESearchEnvelope = serde_json::from_value(payload.as_json()?.clone())?;
        if let Some(error) = envelope.error {
            return Err(CrawlerError::MalformedResponse(format!("esearch error: {}", error)));
        }

        let result = envelope.esearchresult.ok_or_else(|| {
            CrawlerError::MalformedResponse("esearch response has no esearchresult".to_string())
        })?;
        if let Some(error) = result.error {
            return Err(CrawlerError::MalformedResponse(format!("esearch error: {}", error)));
        }

        let count = match &result.count {
            Some(count) => count.value()?,
            None => 0,
        };
        let retstart = cursor.retstart + result.idlist.len();
        let next = (!result.idlist.is_empty() && retstart < count)
            .then_some(PubMedCursor { retstart });

        tracing::debug!(
            "esearch page at {}: {} ids of {} total",
            cursor.retstart,
            result.idlist.len(),
            count
        );

        Ok(Page {
            ids: result.idlist,
            next,
        })
    }

    fn build_metadata_request(&self, id: &str) -> Result<ApiRequest, CrawlerError> {
        self.build_batch_metadata_request(&[id.to_string()])
    }

    fn extract_metadata(&self, id: &str, payload: &Payload) -> Result<ItemMetadata, CrawlerError> {
        parse_articles(payload.as_xml()?)?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| CrawlerError::ItemNotFound(id.to_string()))
    }

    fn max_batch_size(&self) -> usize {
        EFETCH_MAX_IDS
    }

    fn build_batch_metadata_request(&self, ids: &[String]) -> Result<ApiRequest, CrawlerError> {
        if ids.is_empty() || ids.len() > EFETCH_MAX_IDS {
            return Err(CrawlerError::InvalidRequest(format!(
                "efetch takes 1 to {} ids, got {}",
                EFETCH_MAX_IDS,
                ids.len()
            )));
        }

        Ok(self.with_auth(
            ApiRequest::xml("efetch.fcgi")
                .param("db", "pubmed")
                .param("id", ids.join(","))
                .param("retmode", "xml")
                .param("rettype", "abstract"),
        ))
    }

    fn extract_batch_metadata(&self, payload: &Payload) -> Result<Vec<ItemMetadata>, CrawlerError> {
        parse_articles(payload.as_xml()?)
    }

    fn validate_id(&self, id: &str) -> Result<(), CrawlerError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CrawlerError::InvalidRequest(format!(
                "invalid PMID '{}'",
                id
            )));
        }
        Ok(())
    }
}

/// Fields collected from one `<PubmedArticle>`
#[derive(Debug, Default)]
struct ArticleFields {
    pmid: String,
    title: String,
    abstract_sections: Vec<String>,
    authors: Vec<String>,
    journal: String,
    date_parts: Vec<String>,
    medline_date: String,
    doi: String,
    location_doi: String,
}

impl ArticleFields {
    fn into_metadata(self) -> Option<ItemMetadata> {
        let pmid = self.pmid.trim().to_string();
        if pmid.is_empty() {
            return None;
        }

        let title = normalize(&self.title);
        let title = if title.is_empty() {
            "No title".to_string()
        } else {
            title
        };

        let date = if self.date_parts.is_empty() {
            Some(normalize(&self.medline_date))
        } else {
            Some(self.date_parts.join("/"))
        };

        let doi = [self.doi, self.location_doi]
            .into_iter()
            .map(|doi| doi.trim().to_string())
            .find(|doi| !doi.is_empty());
        let journal = Some(normalize(&self.journal)).filter(|j| !j.is_empty());
        let url = format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid);

        Some(
            ItemMetadataBuilder::new(pmid, title, SourceType::PubMed)
                .authors(self.authors)
                .abstract_text(self.abstract_sections.join(" "))
                .date(date)
                .extra("journal", journal)
                .extra("doi", doi)
                .extra("url", url)
                .build(),
        )
    }
}

#[derive(Debug, Default)]
struct AuthorName {
    fore: String,
    last: String,
    collective: String,
}

impl AuthorName {
    fn full_name(&self) -> Option<String> {
        let name = match (normalize(&self.fore), normalize(&self.last)) {
            (fore, last) if !fore.is_empty() && !last.is_empty() => format!("{} {}", fore, last),
            (fore, last) if !last.is_empty() || !fore.is_empty() => format!("{}{}", fore, last),
            _ => normalize(&self.collective),
        };
        (!name.is_empty()).then_some(name)
    }
}

/// Collapse runs of whitespace left by inline markup and line breaks
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, CrawlerError> {
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn ends_with(stack: &[String], tail: &[&str]) -> bool {
    stack.len() >= tail.len()
        && stack[stack.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a == b)
}

/// True inside `Abstract/AbstractText`, including inline markup below it.
/// `OtherAbstract` sections (translations) do not match.
fn in_abstract_text(stack: &[String]) -> bool {
    stack
        .windows(2)
        .any(|pair| pair[0] == "Abstract" && pair[1] == "AbstractText")
}

/// Parse an efetch `PubmedArticleSet` document
///
/// Articles without a PMID are skipped. Inline markup inside titles and
/// abstracts (`<i>`, `<sup>`, ...) is flattened to its text.
fn parse_articles(xml: &str) -> Result<Vec<ItemMetadata>, CrawlerError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut items = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut article: Option<ArticleFields> = None;
    let mut author = AuthorName::default();
    let mut section = String::new();
    let mut in_doi_id = false;
    let mut in_doi_location = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => article = Some(ArticleFields::default()),
                    "Author" => author = AuthorName::default(),
                    "AbstractText" => {
                        section = match attribute(&e, b"Label")? {
                            Some(label) if !label.trim().is_empty() => format!("{}: ", label.trim()),
                            _ => String::new(),
                        };
                    }
                    "ArticleId" => {
                        in_doi_id = ends_with(&stack, &["PubmedData", "ArticleIdList"])
                            && attribute(&e, b"IdType")?.as_deref() == Some("doi");
                    }
                    "ELocationID" => {
                        in_doi_location = attribute(&e, b"EIdType")?.as_deref() == Some("doi");
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                match name.as_str() {
                    "PubmedArticle" => {
                        if let Some(item) = article.take().and_then(ArticleFields::into_metadata) {
                            items.push(item);
                        } else {
                            tracing::warn!("Skipping PubmedArticle without a PMID");
                        }
                    }
                    "Author" => {
                        if let (Some(fields), Some(name)) = (article.as_mut(), author.full_name()) {
                            fields.authors.push(name);
                        }
                    }
                    "AbstractText" if ends_with(&stack, &["Abstract"]) => {
                        let text = normalize(&section);
                        if let Some(fields) = article.as_mut().filter(|_| !text.is_empty()) {
                            fields.abstract_sections.push(text);
                        }
                    }
                    "ArticleId" => in_doi_id = false,
                    "ELocationID" => in_doi_location = false,
                    _ => {}
                }
            }
            Event::Text(e) => {
                let Some(fields) = article.as_mut() else {
                    continue;
                };
                let text = e.unescape()?;

                if stack.iter().any(|n| n == "ArticleTitle") {
                    fields.title.push_str(&text);
                } else if in_abstract_text(&stack) {
                    section.push_str(&text);
                } else if ends_with(&stack, &["MedlineCitation", "PMID"]) {
                    fields.pmid.push_str(&text);
                } else if ends_with(&stack, &["Author", "ForeName"]) {
                    author.fore.push_str(&text);
                } else if ends_with(&stack, &["Author", "LastName"]) {
                    author.last.push_str(&text);
                } else if stack.iter().any(|n| n == "CollectiveName") {
                    author.collective.push_str(&text);
                } else if ends_with(&stack, &["Journal", "Title"]) {
                    fields.journal.push_str(&text);
                } else if ends_with(&stack, &["PubDate", "MedlineDate"]) {
                    fields.medline_date.push_str(&text);
                } else if stack.len() >= 2 && stack[stack.len() - 2] == "PubDate" {
                    let part = text.trim();
                    if !part.is_empty() {
                        fields.date_parts.push(part.to_string());
                    }
                } else if in_doi_id {
                    fields.doi.push_str(&text);
                } else if in_doi_location {
                    fields.location_doi.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{HttpResponse, MockBackend};
    use crate::Crawler;
    use futures_util::TryStreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const ARTICLE_SET: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31452104</PMID>
      <DateCompleted><Year>2020</Year><Month>01</Month><Day>15</Day></DateCompleted>
      <Article PubModel="Print-Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2019</Year><Month>Oct</Month><Day>02</Day></PubDate>
          </JournalIssue>
          <Title>The Lancet. Diabetes &amp; endocrinology</Title>
        </Journal>
        <ArticleTitle>Effect of <i>metformin</i> on
          type 2 diabetes.</ArticleTitle>
        <ELocationID EIdType="pii" ValidYN="Y">S2213-8587(19)30001-X</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND" NlmCategory="BACKGROUND">Metformin is first-line.</AbstractText>
          <AbstractText Label="METHODS">We ran a trial with HbA<sub>1c</sub> endpoints.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Smith</LastName><ForeName>Jane A</ForeName><Initials>JA</Initials></Author>
          <Author ValidYN="Y"><LastName>Doe</LastName><ForeName>John</ForeName></Author>
          <Author ValidYN="Y"><CollectiveName>DIAB Study Group</CollectiveName></Author>
        </AuthorList>
      </Article>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="CommentIn"><PMID Version="1">99999999</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31452104</ArticleId>
        <ArticleId IdType="doi">10.1016/S2213-8587(19)30001-X</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference>
          <ArticleIdList><ArticleId IdType="doi">10.1000/reference</ArticleId></ArticleIdList>
        </Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">20000002</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><MedlineDate>1998 Dec-1999 Jan</MedlineDate></PubDate></JournalIssue>
          <Title>Diabetes Care</Title>
        </Journal>
        <ArticleTitle></ArticleTitle>
        <ELocationID EIdType="doi">10.2337/example</ELocationID>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn adapter() -> PubMedAdapter {
        PubMedAdapter::new("medcrawler")
    }

    #[test]
    fn test_search_request_params() {
        let adapter = PubMedAdapter::from_config(
            &CrawlerConfig::default()
                .with_contact_email("lab@example.org")
                .with_api_key("secret"),
        );
        let query = SearchQuery::new("diabetes");

        let request = adapter
            .build_search_request(&query, &PubMedCursor { retstart: 200 })
            .unwrap();

        assert_eq!(request.endpoint, "esearch.fcgi");
        assert_eq!(request.get_param("db"), Some("pubmed"));
        assert_eq!(request.get_param("term"), Some("diabetes"));
        assert_eq!(request.get_param("retmax"), Some("100"));
        assert_eq!(request.get_param("retstart"), Some("200"));
        assert_eq!(request.get_param("retmode"), Some("json"));
        assert_eq!(request.get_param("tool"), Some("medcrawler"));
        assert_eq!(request.get_param("email"), Some("lab@example.org"));
        assert_eq!(request.get_param("api_key"), Some("secret"));
    }

    #[test]
    fn test_retmax_shrinks_to_max_results() {
        let request = adapter()
            .build_search_request(&SearchQuery::new("x").max_results(7), &PubMedCursor::default())
            .unwrap();
        assert_eq!(request.get_param("retmax"), Some("7"));
        assert_eq!(request.get_param("email"), None);
    }

    #[test]
    fn test_date_range_term() {
        let both = SearchQuery::new("cancer")
            .from_date("2020/01/01")
            .to_date("2020/12/31");
        assert_eq!(
            PubMedAdapter::search_term(&both).unwrap(),
            "(cancer) AND (2020/01/01:2020/12/31[PDAT])"
        );

        let open_start = SearchQuery::new("cancer").to_date("2001/06/30");
        assert_eq!(
            PubMedAdapter::search_term(&open_start).unwrap(),
            "(cancer) AND (1800/01/01:2001/06/30[PDAT])"
        );

        let open_end = SearchQuery::new("cancer").from_date("2022/02/28");
        assert_eq!(
            PubMedAdapter::search_term(&open_end).unwrap(),
            "(cancer) AND (2022/02/28:3000/12/31[PDAT])"
        );
    }

    #[test]
    fn test_invalid_dates_and_queries() {
        for bad in ["2020-01-01", "2020/13/01", "2021/02/29", "yesterday"] {
            let query = SearchQuery::new("x").from_date(bad);
            assert!(
                matches!(
                    adapter().build_search_request(&query, &PubMedCursor::default()),
                    Err(CrawlerError::InvalidRequest(_))
                ),
                "{} should be rejected",
                bad
            );
        }

        let empty = SearchQuery::new("  ");
        assert!(PubMedAdapter::search_term(&empty).is_err());
    }

    #[test]
    fn test_extract_ids_pagination() {
        let payload = Payload::Json(json!({
            "header": {"type": "esearch", "version": "0.3"},
            "esearchresult": {"count": "5", "retmax": "2", "retstart": "0", "idlist": ["1", "2"]}
        }));
        let page = adapter()
            .extract_ids(&payload, &PubMedCursor::default())
            .unwrap();
        assert_eq!(page.ids, vec!["1", "2"]);
        assert_eq!(page.next, Some(PubMedCursor { retstart: 2 }));

        let last = Payload::Json(json!({"esearchresult": {"count": 5, "idlist": ["5"]}}));
        let page = adapter()
            .extract_ids(&last, &PubMedCursor { retstart: 4 })
            .unwrap();
        assert_eq!(page.next, None);

        let empty = Payload::Json(json!({"esearchresult": {"count": "0", "idlist": []}}));
        let page = adapter()
            .extract_ids(&empty, &PubMedCursor::default())
            .unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_extract_ids_errors() {
        let error = Payload::Json(json!({"esearchresult": {"ERROR": "Invalid query"}}));
        assert!(matches!(
            adapter().extract_ids(&error, &PubMedCursor::default()),
            Err(CrawlerError::MalformedResponse(_))
        ));

        let shapeless = Payload::Json(json!({"unexpected": true}));
        assert!(matches!(
            adapter().extract_ids(&shapeless, &PubMedCursor::default()),
            Err(CrawlerError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_articles() {
        let items = parse_articles(ARTICLE_SET).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "31452104");
        assert_eq!(first.title, "Effect of metformin on type 2 diabetes.");
        assert_eq!(
            first.authors,
            vec!["Jane A Smith", "John Doe", "DIAB Study Group"]
        );
        assert_eq!(
            first.r#abstract,
            "BACKGROUND: Metformin is first-line. METHODS: We ran a trial with HbA1c endpoints."
        );
        assert_eq!(first.date.as_deref(), Some("2019/Oct/02"));
        assert_eq!(
            first.extra_str("journal"),
            Some("The Lancet. Diabetes & endocrinology")
        );
        assert_eq!(first.extra_str("doi"), Some("10.1016/S2213-8587(19)30001-X"));
        assert_eq!(
            first.extra_str("url"),
            Some("https://pubmed.ncbi.nlm.nih.gov/31452104/")
        );
        assert_eq!(first.source, SourceType::PubMed);

        let second = &items[1];
        assert_eq!(second.id, "20000002");
        assert_eq!(second.title, "No title");
        assert!(second.authors.is_empty());
        assert_eq!(second.date.as_deref(), Some("1998 Dec-1999 Jan"));
        assert_eq!(second.extra_str("doi"), Some("10.2337/example"));
    }

    #[test]
    fn test_extract_metadata_by_id() {
        let payload = Payload::Xml(ARTICLE_SET.to_string());

        let item = adapter().extract_metadata("20000002", &payload).unwrap();
        assert_eq!(item.extra_str("journal"), Some("Diabetes Care"));

        let missing = adapter().extract_metadata("1", &payload);
        assert!(matches!(missing, Err(CrawlerError::ItemNotFound(id)) if id == "1"));

        let empty = Payload::Xml("<PubmedArticleSet></PubmedArticleSet>".to_string());
        assert!(adapter().extract_metadata("1", &empty).is_err());
    }

    #[test]
    fn test_other_abstract_is_ignored() {
        let xml = r#"<PubmedArticleSet><PubmedArticle>
          <MedlineCitation>
            <PMID>30000003</PMID>
            <Article>
              <ArticleTitle>Insulin pumps.</ArticleTitle>
              <Abstract><AbstractText>Pumps help <i>some</i> patients.</AbstractText></Abstract>
            </Article>
            <OtherAbstract Type="Publisher" Language="spa">
              <AbstractText>Las bombas ayudan.</AbstractText>
            </OtherAbstract>
          </MedlineCitation>
        </PubmedArticle></PubmedArticleSet>"#;

        let items = parse_articles(xml).unwrap();
        assert_eq!(items[0].r#abstract, "Pumps help some patients.");
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = parse_articles("<PubmedArticleSet><PubmedArticle></Wrong>");
        assert!(matches!(result, Err(CrawlerError::MalformedResponse(_))));
    }

    #[test]
    fn test_batch_request() {
        let ids: Vec<String> = vec!["1".into(), "22".into(), "333".into()];
        let request = adapter().build_batch_metadata_request(&ids).unwrap();

        assert_eq!(request.endpoint, "efetch.fcgi");
        assert_eq!(request.get_param("id"), Some("1,22,333"));
        assert_eq!(request.get_param("rettype"), Some("abstract"));
        assert_eq!(request.get_param("retmode"), Some("xml"));
        assert_eq!(request.get_param("tool"), Some("medcrawler"));

        let too_many: Vec<String> = (0..=EFETCH_MAX_IDS).map(|i| i.to_string()).collect();
        assert!(adapter().build_batch_metadata_request(&too_many).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(adapter().validate_id("31452104").is_ok());
        assert!(adapter().validate_id("").is_err());
        assert!(adapter().validate_id("PMC123").is_err());
        assert!(adapter().validate_id("12 34").is_err());
    }

    fn mock_crawler(backend: &Arc<MockBackend>) -> Crawler<PubMedAdapter> {
        let config = CrawlerConfig::default()
            .with_base_url("http://mock.test/")
            .with_retry_delays(Duration::from_millis(10), Duration::from_millis(100));
        Crawler::with_backend(PubMedAdapter::from_config(&config), config, backend.clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_two_pages() {
        let backend = Arc::new(MockBackend::new());
        backend
            .enqueue(
                "esearch.fcgi",
                HttpResponse::json(200, &json!({"esearchresult": {"count": "3", "idlist": ["101", "102"]}})),
            )
            .enqueue(
                "esearch.fcgi",
                HttpResponse::json(200, &json!({"esearchresult": {"count": "3", "idlist": ["103"]}})),
            );
        let crawler = mock_crawler(&backend);

        let ids: Vec<String> = crawler
            .search(SearchQuery::new("diabetes").max_results(3))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ids, vec!["101", "102", "103"]);
        let calls = backend.calls_to("esearch.fcgi");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].query_param("retstart").as_deref(), Some("0"));
        assert_eq!(calls[1].query_param("retstart").as_deref(), Some("2"));
        assert_eq!(calls[0].query_param("term").as_deref(), Some("diabetes"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_uses_one_efetch() {
        let backend = Arc::new(MockBackend::new());
        backend.always("efetch.fcgi", HttpResponse::text(200, ARTICLE_SET));
        let crawler = mock_crawler(&backend);

        let result = crawler
            .get_items_batch(["31452104", "20000002", "55555555"])
            .await;

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.failed_ids().collect::<Vec<_>>(), vec!["55555555"]);
        assert!(result.failures[0].not_found);

        let calls = backend.calls_to("efetch.fcgi");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].query_param("id").as_deref(),
            Some("31452104,20000002,55555555")
        );
    }
}
