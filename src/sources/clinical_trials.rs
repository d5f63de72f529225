//! ClinicalTrials.gov source adapter using the v2 REST API.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::{CrawlerError, Page, SourceAdapter};
use crate::models::{ItemMetadata, ItemMetadataBuilder, SearchQuery, SourceType};
use crate::utils::{ApiRequest, Payload};

/// ClinicalTrials.gov API v2 base URL
const CLINICAL_TRIALS_BASE_URL: &str = "https://clinicaltrials.gov/api/v2/";

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;
const DATE_FORMAT: &str = "%Y-%m-%d";

const NCT_ID_POINTER: &str = "/protocolSection/identificationModule/nctId";

/// Pagination state for `studies` searches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClinicalTrialsCursor {
    /// `nextPageToken` from the previous page; `None` on the first page
    pub page_token: Option<String>,
}

/// ClinicalTrials.gov adapter
#[derive(Debug, Clone)]
pub struct ClinicalTrialsAdapter {
    page_size: usize,
}

impl ClinicalTrialsAdapter {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the page size (clamped to 1..=1000)
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// `filter.advanced` expression restricting the study start date
    ///
    /// Both bounds filter `StartDate`: `from_date` is the earliest start and
    /// `to_date` the latest start. Neither bound looks at `LastUpdatePostDate`.
    /// The dates are passed through exactly as given once validated.
    fn date_filter(query: &SearchQuery) -> Result<Option<String>, CrawlerError> {
        if !query.has_date_filter() {
            return Ok(None);
        }

        let from = validate_date(query.from_date.as_deref())?.unwrap_or("MIN");
        let to = validate_date(query.to_date.as_deref())?.unwrap_or("MAX");
        Ok(Some(format!("AREA[StartDate]RANGE[{},{}]", from, to)))
    }
}

impl Default for ClinicalTrialsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_date(date: Option<&str>) -> Result<Option<&str>, CrawlerError> {
    match date {
        None => Ok(None),
        Some(date) => NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map(|_| Some(date))
            .map_err(|_| {
                CrawlerError::InvalidRequest(format!(
                    "invalid ClinicalTrials.gov date '{}', expected YYYY-MM-DD",
                    date
                ))
            }),
    }
}

// ClinicalTrials.gov v2 study structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
    protocol_section: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProtocolSection {
    identification_module: IdentificationModule,
    status_module: StatusModule,
    sponsor_collaborators_module: SponsorCollaboratorsModule,
    description_module: DescriptionModule,
    conditions_module: ConditionsModule,
    design_module: DesignModule,
    eligibility_module: EligibilityModule,
    contacts_locations_module: ContactsLocationsModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IdentificationModule {
    nct_id: Option<String>,
    brief_title: Option<String>,
    official_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatusModule {
    overall_status: Option<String>,
    start_date_struct: Option<DateStruct>,
    primary_completion_date_struct: Option<DateStruct>,
    completion_date_struct: Option<DateStruct>,
    last_update_submit_date: Option<String>,
    last_update_post_date_struct: Option<DateStruct>,
}

#[derive(Debug, Deserialize)]
struct DateStruct {
    date: Option<String>,
}

fn date_of(date: &Option<DateStruct>) -> Option<String> {
    date.as_ref().and_then(|d| d.date.clone())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SponsorCollaboratorsModule {
    lead_sponsor: Option<NamedEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DescriptionModule {
    brief_summary: Option<String>,
    detailed_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionsModule {
    conditions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DesignModule {
    phases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EligibilityModule {
    eligibility_criteria: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContactsLocationsModule {
    overall_officials: Vec<NamedEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamedEntity {
    name: Option<String>,
}

impl Study {
    fn into_metadata(self, id: &str) -> ItemMetadata {
        let protocol = self.protocol_section;
        let identification = protocol.identification_module;
        let status = protocol.status_module;
        let description = protocol.description_module;

        let title = identification
            .brief_title
            .or(identification.official_title)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "No title".to_string());

        let authors = protocol
            .contacts_locations_module
            .overall_officials
            .into_iter()
            .filter_map(|official| official.name)
            .filter(|name| !name.trim().is_empty())
            .collect();

        let completion_date =
            date_of(&status.completion_date_struct).or(date_of(&status.primary_completion_date_struct));
        let last_updated = date_of(&status.last_update_post_date_struct).or(status.last_update_submit_date);

        ItemMetadataBuilder::new(id, title, SourceType::ClinicalTrials)
            .authors(authors)
            .abstract_text(description.brief_summary.unwrap_or_default())
            .date(date_of(&status.start_date_struct))
            .extra("status", status.overall_status)
            .extra("phases", protocol.design_module.phases)
            .extra("conditions", protocol.conditions_module.conditions)
            .extra("detailed_description", description.detailed_description)
            .extra(
                "eligibility_criteria",
                protocol.eligibility_module.eligibility_criteria,
            )
            .extra("completion_date", completion_date)
            .extra("last_updated", last_updated)
            .extra(
                "lead_sponsor",
                protocol
                    .sponsor_collaborators_module
                    .lead_sponsor
                    .and_then(|sponsor| sponsor.name),
            )
            .extra("url", format!("https://clinicaltrials.gov/study/{}", id))
            .build()
    }
}

impl SourceAdapter for ClinicalTrialsAdapter {
    type Cursor = ClinicalTrialsCursor;

    fn id(&self) -> &str {
        "clinical_trials"
    }

    fn name(&self) -> &str {
        "ClinicalTrials.gov"
    }

    fn source_type(&self) -> SourceType {
        SourceType::ClinicalTrials
    }

    fn default_base_url(&self) -> &str {
        CLINICAL_TRIALS_BASE_URL
    }

    fn build_search_request(
        &self,
        query: &SearchQuery,
        cursor: &ClinicalTrialsCursor,
    ) -> Result<ApiRequest, CrawlerError> {
        let filter = Self::date_filter(query)?;
        let term = Some(query.query.trim()).filter(|t| !t.is_empty());
        let page_size = match query.max_results {
            Some(max) if max > 0 => self.page_size.min(max),
            _ => self.page_size,
        };

        Ok(ApiRequest::json("studies")
            .param_opt("query.term", term)
            .param_opt("filter.advanced", filter)
            .param("pageSize", page_size)
            .param("format", "json")
            .param_opt("pageToken", cursor.page_token.as_deref()))
    }

    fn extract_ids(
        &self,
        payload: &Payload,
        _cursor: &ClinicalTrialsCursor,
    ) -> Result<Page<ClinicalTrialsCursor>, CrawlerError> {
        let data = payload.as_json()?;
        let studies = data
            .get("studies")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CrawlerError::MalformedResponse("studies response has no 'studies' array".to_string())
            })?;

        let mut ids = Vec::with_capacity(studies.len());
        for study in studies {
            match study.pointer(NCT_ID_POINTER).and_then(Value::as_str) {
                Some(id) if !id.is_empty() => ids.push(id.to_string()),
                _ => tracing::warn!("Skipping study without an NCT ID"),
            }
        }

        let next = data
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(|token| ClinicalTrialsCursor {
                page_token: Some(token.to_string()),
            });

        Ok(Page { ids, next })
    }

    fn build_metadata_request(&self, id: &str) -> Result<ApiRequest, CrawlerError> {
        Ok(ApiRequest::json(format!("studies/{}", id)).param("format", "json"))
    }

    fn extract_metadata(&self, id: &str, payload: &Payload) -> Result<ItemMetadata, CrawlerError> {
        let data = payload.as_json()?;

        // Per-id responses are a bare study; tolerate the list shape as well
        let study = match data.get("studies").and_then(Value::as_array) {
            Some(studies) => studies
                .iter()
                .find(|study| study.pointer(NCT_ID_POINTER).and_then(Value::as_str) == Some(id))
                .ok_or_else(|| CrawlerError::ItemNotFound(id.to_string()))?,
            None => data,
        };

        if study.get("protocolSection").is_none() {
            return Err(CrawlerError::MalformedResponse(format!(
                "study {} has no protocolSection",
                id
            )));
        }

        let study: Study = serde_json::from_value(study.clone())?;
        match study.protocol_section.identification_module.nct_id.as_deref() {
            Some(found) if found != id => Err(CrawlerError::ItemNotFound(id.to_string())),
            _ => Ok(study.into_metadata(id)),
        }
    }

    fn validate_id(&self, id: &str) -> Result<(), CrawlerError> {
        let valid = id.len() == 11
            && id.starts_with("NCT")
            && id[3..].bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(CrawlerError::InvalidRequest(format!(
                "invalid NCT ID '{}'",
                id
            )));
        }
        Ok(())
    }
}
