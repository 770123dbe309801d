/// Gmail and Calendar REST calls made on a user's behalf
///
/// Every call takes the user's access token; callers obtain it from
/// `GoogleAccounts::fresh_access_token`. Messages are built with lettre and
/// handed to Gmail as base64url encoded RFC 2822 text.

use crate::config::GoogleConfig;
use crate::google::oauth::GoogleError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use reqwest::{header::ACCEPT, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

/// Maximum number of response body characters kept in error messages
const ERROR_BODY_LIMIT: usize = 500;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Calendar used when a request names none
pub const DEFAULT_CALENDAR: &str = "primary";

/// Headers read from the original message when replying
const REPLY_HEADERS: [&str; 5] = ["Message-ID", "References", "Subject", "From", "Reply-To"];

/// A new message; address lists are comma separated
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    /// Send `body` as text/html instead of text/plain
    #[serde(default)]
    pub html: bool,
}

/// Answer to an existing Gmail message, kept in its thread
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyEmail {
    /// Gmail id of the message being answered
    pub message_id: String,
    pub body: String,
    #[serde(default)]
    pub html: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    /// Gmail search syntax, e.g. "is:unread from:alice@example.com"
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelChange {
    pub message_id: String,
    #[serde(default)]
    pub add_label_ids: Vec<String>,
    #[serde(default)]
    pub remove_label_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Defaults to now
    #[serde(default)]
    pub time_min: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_results: Option<u32>,
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<FixedOffset>,
    /// Defaults to one hour after `start`
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,
    /// IANA zone name such as "America/Jamaica"
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Client for the Gmail v1 and Calendar v3 REST APIs
#[derive(Debug, Clone)]
pub struct GoogleApi {
    http: reqwest::Client,
    gmail_base: Url,
    calendar_base: Url,
}

impl GoogleApi {
    pub fn new(config: &GoogleConfig) -> Result<Self, GoogleError> {
        let parse = |raw: &str| {
            Url::parse(raw.trim()).map_err(|e| GoogleError::InvalidEndpoint(format!("{raw}: {e}")))
        };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            gmail_base: parse(&config.gmail_api_base)?,
            calendar_base: parse(&config.calendar_api_base)?,
        })
    }

    fn gmail_url(&self, segments: &[&str]) -> Result<Url, GoogleError> {
        let full: Vec<&str> = ["gmail", "v1", "users", "me"]
            .into_iter()
            .chain(segments.iter().copied())
            .collect();
        extend(&self.gmail_base, &full)
    }

    fn calendar_url(&self, calendar_id: &str, segments: &[&str]) -> Result<Url, GoogleError> {
        let full: Vec<&str> = ["calendar", "v3", "calendars", calendar_id]
            .into_iter()
            .chain(segments.iter().copied())
            .collect();
        extend(&self.calendar_base, &full)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        access_token: &str,
        body: Option<&Value>,
    ) -> Result<Value, GoogleError> {
        tracing::debug!("🌍 Google request: {} {}", method, url.path());

        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!("❌ Google {} {} returned {}: {}", method, url.path(), status, body);
            return Err(GoogleError::Api {
                method,
                path: url.path().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Deletes answer 204 without a body
        if text.trim().is_empty() {
            return Ok(json!({}));
        }

        serde_json::from_str(&text)
            .map_err(|e| GoogleError::InvalidResponse(format!("{method} {}: {e}", url.path())))
    }

    /// Address of the mailbox the token belongs to
    pub async fn profile_email(&self, access_token: &str) -> Result<String, GoogleError> {
        let profile = self
            .request(Method::GET, self.gmail_url(&["profile"])?, access_token, None)
            .await?;
        profile
            .get("emailAddress")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GoogleError::InvalidResponse("profile has no emailAddress".into()))
    }

    pub async fn send_message(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
    ) -> Result<Value, GoogleError> {
        let from = self.profile_email(access_token).await?;
        let raw = encode_message(&from, email, None)?;
        self.request(
            Method::POST,
            self.gmail_url(&["messages", "send"])?,
            access_token,
            Some(&json!({ "raw": raw })),
        )
        .await
    }

    pub async fn create_draft(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
    ) -> Result<Value, GoogleError> {
        let from = self.profile_email(access_token).await?;
        let raw = encode_message(&from, email, None)?;
        self.request(
            Method::POST,
            self.gmail_url(&["drafts"])?,
            access_token,
            Some(&json!({ "message": { "raw": raw } })),
        )
        .await
    }

    /// Reply to the sender of `reply.message_id` inside the same thread
    pub async fn reply(&self, access_token: &str, reply: &ReplyEmail) -> Result<Value, GoogleError> {
        let mut url = self.gmail_url(&["messages", &reply.message_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "metadata");
            for header in REPLY_HEADERS {
                query.append_pair("metadataHeaders", header);
            }
        }
        let original = self.request(Method::GET, url, access_token, None).await?;
        let thread_id = original
            .get("threadId")
            .and_then(Value::as_str)
            .ok_or_else(|| GoogleError::InvalidResponse("message has no threadId".into()))?
            .to_string();
        let context = ReplyContext::from_metadata(&original)?;

        let from = self.profile_email(access_token).await?;
        let email = OutgoingEmail {
            to: context.recipient.clone(),
            cc: None,
            bcc: None,
            subject: context.subject.clone(),
            body: reply.body.clone(),
            html: reply.html,
        };
        let raw = encode_message(&from, &email, Some(&context))?;

        self.request(
            Method::POST,
            self.gmail_url(&["messages", "send"])?,
            access_token,
            Some(&json!({ "raw": raw, "threadId": thread_id })),
        )
        .await
    }

    pub async fn list_messages(
        &self,
        access_token: &str,
        query: &MessageQuery,
    ) -> Result<Value, GoogleError> {
        let mut url = self.gmail_url(&["messages"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("maxResults", &query.max_results.unwrap_or(10).clamp(1, 500).to_string());
            if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
                pairs.append_pair("q", q);
            }
            for label in &query.label_ids {
                pairs.append_pair("labelIds", label);
            }
        }
        self.request(Method::GET, url, access_token, None).await
    }

    pub async fn list_labels(&self, access_token: &str) -> Result<Value, GoogleError> {
        self.request(Method::GET, self.gmail_url(&["labels"])?, access_token, None)
            .await
    }

    pub async fn modify_labels(
        &self,
        access_token: &str,
        change: &LabelChange,
    ) -> Result<Value, GoogleError> {
        if change.add_label_ids.is_empty() && change.remove_label_ids.is_empty() {
            return Err(GoogleError::InvalidRequest(
                "Provide add_label_ids or remove_label_ids".into(),
            ));
        }
        self.request(
            Method::POST,
            self.gmail_url(&["messages", &change.message_id, "modify"])?,
            access_token,
            Some(&json!({
                "addLabelIds": change.add_label_ids,
                "removeLabelIds": change.remove_label_ids,
            })),
        )
        .await
    }

    /// Ask Gmail to publish mailbox changes to a Pub/Sub topic
    pub async fn watch_mailbox(
        &self,
        access_token: &str,
        topic_name: &str,
        label_ids: &[String],
    ) -> Result<Value, GoogleError> {
        let mut body = json!({ "topicName": topic_name });
        if !label_ids.is_empty() {
            body["labelIds"] = json!(label_ids);
        }
        self.request(Method::POST, self.gmail_url(&["watch"])?, access_token, Some(&body))
            .await
    }

    /// Upcoming single events ordered by start time
    pub async fn list_events(
        &self,
        access_token: &str,
        query: &EventQuery,
    ) -> Result<Value, GoogleError> {
        let calendar_id = query.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR);
        let time_min = query.time_min.unwrap_or_else(Utc::now);

        let mut url = self.calendar_url(calendar_id, &["events"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("timeMin", &time_min.to_rfc3339_opts(SecondsFormat::Secs, true));
            if let Some(time_max) = query.time_max {
                pairs.append_pair("timeMax", &time_max.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            pairs.append_pair("maxResults", &query.max_results.unwrap_or(10).clamp(1, 250).to_string());
            pairs.append_pair("singleEvents", "true");
            pairs.append_pair("orderBy", "startTime");
            if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
                pairs.append_pair("q", q);
            }
        }
        self.request(Method::GET, url, access_token, None).await
    }

    pub async fn create_event(&self, access_token: &str, event: &NewEvent) -> Result<Value, GoogleError> {
        let calendar_id = event.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR);
        let body = event_resource(event)?;
        self.request(
            Method::POST,
            self.calendar_url(calendar_id, &["events"])?,
            access_token,
            Some(&body),
        )
        .await
    }

    pub async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: Option<&str>,
        event_id: &str,
    ) -> Result<(), GoogleError> {
        let calendar_id = calendar_id.unwrap_or(DEFAULT_CALENDAR);
        self.request(
            Method::DELETE,
            self.calendar_url(calendar_id, &["events", event_id])?,
            access_token,
            None,
        )
        .await?;
        Ok(())
    }

    /// Open a push channel delivering calendar changes to `address`
    pub async fn watch_calendar(
        &self,
        access_token: &str,
        calendar_id: Option<&str>,
        address: &str,
        channel_token: Option<&str>,
    ) -> Result<Value, GoogleError> {
        let calendar_id = calendar_id.unwrap_or(DEFAULT_CALENDAR);
        let mut body = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "type": "web_hook",
            "address": address,
        });
        if let Some(token) = channel_token {
            body["token"] = json!(token);
        }
        self.request(
            Method::POST,
            self.calendar_url(calendar_id, &["events", "watch"])?,
            access_token,
            Some(&body),
        )
        .await
    }
}

/// Append percent-encoded path segments to an API root
fn extend(base: &Url, segments: &[&str]) -> Result<Url, GoogleError> {
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(GoogleError::InvalidRequest("Identifiers must not be empty".into()));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GoogleError::InvalidEndpoint(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Threading details taken from the message being answered
#[derive(Debug, Clone, PartialEq)]
struct ReplyContext {
    recipient: String,
    subject: String,
    in_reply_to: String,
    references: String,
}

impl ReplyContext {
    fn from_metadata(message: &Value) -> Result<Self, GoogleError> {
        let header = |name: &str| -> Option<String> {
            message
                .pointer("/payload/headers")?
                .as_array()?
                .iter()
                .find(|h| h["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name)))
                .and_then(|h| h["value"].as_str())
                .map(str::to_string)
        };

        let recipient = header("Reply-To")
            .or_else(|| header("From"))
            .ok_or_else(|| GoogleError::InvalidResponse("message has no sender".into()))?;
        let in_reply_to = header("Message-ID")
            .ok_or_else(|| GoogleError::InvalidResponse("message has no Message-ID".into()))?;
        let references = match header("References") {
            Some(previous) if !previous.trim().is_empty() => format!("{} {}", previous.trim(), in_reply_to),
            _ => in_reply_to.clone(),
        };
        let subject = header("Subject").unwrap_or_default();
        let subject = if subject.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
            subject
        } else {
            format!("Re: {subject}")
        };

        Ok(Self {
            recipient,
            subject,
            in_reply_to,
            references,
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, GoogleError> {
    address
        .trim()
        .parse()
        .map_err(|e| GoogleError::InvalidRequest(format!("Invalid address '{}': {e}", address.trim())))
}

fn addresses(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|a| !a.trim().is_empty())
}

/// Build the RFC 2822 message Gmail expects in `raw`
fn encode_message(
    from: &str,
    email: &OutgoingEmail,
    reply: Option<&ReplyContext>,
) -> Result<String, GoogleError> {
    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .subject(email.subject.clone())
        .keep_bcc();

    for to in addresses(&email.to) {
        builder = builder.to(mailbox(to)?);
    }
    for cc in email.cc.as_deref().map(addresses).into_iter().flatten() {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in email.bcc.as_deref().map(addresses).into_iter().flatten() {
        builder = builder.bcc(mailbox(bcc)?);
    }
    if let Some(reply) = reply {
        builder = builder
            .in_reply_to(reply.in_reply_to.clone())
            .references(reply.references.clone());
    }

    let content_type = if email.html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };
    let message = builder
        .header(content_type)
        .body(email.body.clone())
        .map_err(|e| GoogleError::InvalidRequest(format!("Cannot build email: {e}")))?;

    Ok(general_purpose::URL_SAFE.encode(message.formatted()))
}

/// Calendar v3 event resource for a new event
fn event_resource(event: &NewEvent) -> Result<Value, GoogleError> {
    if event.summary.trim().is_empty() {
        return Err(GoogleError::InvalidRequest("'summary' must not be empty".into()));
    }
    let end = event.end.unwrap_or(event.start + Duration::hours(1));
    if end <= event.start {
        return Err(GoogleError::InvalidRequest("'end' must be after 'start'".into()));
    }

    let moment = |at: DateTime<FixedOffset>| {
        let mut value = json!({ "dateTime": at.to_rfc3339_opts(SecondsFormat::Secs, true) });
        if let Some(zone) = &event.time_zone {
            value["timeZone"] = json!(zone);
        }
        value
    };

    let mut resource = json!({
        "summary": event.summary,
        "start": moment(event.start),
        "end": moment(end),
    });
    if let Some(description) = &event.description {
        resource["description"] = json!(description);
    }
    if let Some(location) = &event.location {
        resource["location"] = json!(location);
    }
    if !event.attendees.is_empty() {
        resource["attendees"] = event
            .attendees
            .iter()
            .map(|email| json!({ "email": email.trim() }))
            .collect();
    }
    Ok(resource)
}
