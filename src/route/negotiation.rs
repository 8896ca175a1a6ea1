//! Content negotiation: consumed request media types and produced response media types.

use crate::error::WebError;
use crate::route::descriptor::RouteDescriptor;
use crate::route::table::RouteSlot;
use mime::Mime;

#[derive(Clone, Debug, Default)]
pub struct MediaSet {
    consumes: Vec<Mime>,
    produces: Vec<Mime>,
}

impl MediaSet {
    pub fn parse(consumes: &[String], produces: &[String]) -> Result<Self, String> {
        Ok(MediaSet {
            consumes: parse_all(consumes)?,
            produces: parse_all(produces)?,
        })
    }

    pub fn consumes(&self) -> &[Mime] {
        &self.consumes
    }

    pub fn produces(&self) -> &[Mime] {
        &self.produces
    }

    /// Checks the request's `Content-Type` and `Accept` and returns the media type to produce.
    /// An empty consumed set accepts any request; an empty produced set answers JSON.
    pub fn negotiate(
        &self,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Mime, WebError> {
        if !self.consumes.is_empty() {
            let supported = content_type
                .and_then(|ct| ct.parse::<Mime>().ok())
                .map(|ct| self.consumes.iter().any(|c| media_matches(c, &ct)))
                .unwrap_or(false);
            if !supported {
                return Err(WebError::unsupported_media_type(
                    content_type.unwrap_or(""),
                    &join(&self.consumes),
                ));
            }
        }

        let accept = accept.map(str::trim).filter(|a| !a.is_empty());
        let Some(accept) = accept else {
            return Ok(self
                .produces
                .first()
                .cloned()
                .unwrap_or(mime::APPLICATION_JSON));
        };
        if self.produces.is_empty() {
            return Ok(mime::APPLICATION_JSON);
        }
        for wanted in accepted_ranges(accept) {
            if let Some(found) = self.produces.iter().find(|p| media_matches(&wanted, p)) {
                return Ok(found.clone());
            }
        }
        Err(WebError::not_acceptable(accept, &join(&self.produces)))
    }
}

/// Binds the consumed/produced sets onto a slot.
pub struct NegotiationBinder;

impl NegotiationBinder {
    pub fn bind(slot: &mut RouteSlot, descriptor: &RouteDescriptor) -> Result<(), WebError> {
        let media = MediaSet::parse(&descriptor.consumes, &descriptor.produces).map_err(|reason| {
            WebError::invalid_descriptor(
                "negotiation",
                descriptor.method.as_str(),
                &descriptor.path,
                &reason,
            )
        })?;
        slot.media = media;
        Ok(())
    }
}

fn parse_all(media: &[String]) -> Result<Vec<Mime>, String> {
    media
        .iter()
        .map(|m| {
            m.parse::<Mime>()
                .map_err(|e| format!("invalid media type '{}': {}", m, e))
        })
        .collect()
}

/// `pattern` may use `*` for type or subtype; parameters are ignored.
fn media_matches(pattern: &Mime, candidate: &Mime) -> bool {
    (pattern.type_() == mime::STAR || pattern.type_() == candidate.type_())
        && (pattern.subtype() == mime::STAR || pattern.subtype() == candidate.subtype())
}

/// Accept ranges sorted by descending quality; `q=0` ranges are dropped.
fn accepted_ranges(accept: &str) -> Vec<Mime> {
    let mut ranges: Vec<(f32, Mime)> = accept
        .split(',')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|m| {
            let q = m
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q, m)
        })
        .filter(|(q, _)| *q > 0.0)
        .collect();
    ranges.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranges.into_iter().map(|(_, m)| m).collect()
}

fn join(media: &[Mime]) -> String {
    media
        .iter()
        .map(|m| m.essence_str())
        .collect::<Vec<_>>()
        .join(", ")
}
