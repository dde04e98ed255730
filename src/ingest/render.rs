// src/ingest/render.rs
//! Listing card rendering.
//!
//! The normalizer only needs `Listing -> String`; how the card looks is the
//! renderer's business. [`HtmlRenderer`] is the card the map UI shows in its
//! popup. Every value coming from upstream is escaped except the web
//! description, which the source already delivers as markup.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use thiserror::Error;

use crate::ingest::types::Listing;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template write failed")]
    Write(#[from] std::fmt::Error),
    #[error("{0}")]
    Other(String),
}

pub trait Renderer: Send + Sync {
    fn render(&self, listing: &Listing) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

/// "January  8 6:04:45 AM 2014"
fn nice_date(ts: &DateTime<Utc>) -> String {
    ts.format("%B %e %-I:%M:%S %p %Y").to_string()
}

/// "February 26 2014"
fn short_date(ts: &DateTime<Utc>) -> String {
    ts.format("%B %e %Y").to_string()
}

/// Links in the feed are often bare hostnames.
fn with_scheme(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn join_non_empty(sep: &str, parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(sep)
}

impl Renderer for HtmlRenderer {
    fn render(&self, listing: &Listing) -> Result<String, RenderError> {
        let r = &listing.raw;
        let mut out = String::with_capacity(1024);

        out.push_str("<button>&times;</button>\n<div class=\"event\">\n");
        writeln!(out, "<h1>{}</h1>", text(&r.event_name))?;

        let crumbs = join_non_empty(
            " / ",
            &[
                r.borough.as_str(),
                r.neighborhood.as_str(),
                r.category.as_str(),
                r.subcategory.as_str(),
            ],
        );
        if !crumbs.is_empty() {
            writeln!(out, "<p>{}</p>", text(&crumbs))?;
        }

        if !r.date_time_description.is_empty() {
            writeln!(out, "<p>When: {}</p>", text(&r.date_time_description))?;
        }
        if !r.web_description.is_empty() {
            writeln!(out, "<blockquote>{}</blockquote>", r.web_description)?;
        }
        write_link(&mut out, "Details", &r.event_detail_url)?;

        if !r.venue_name.is_empty() {
            writeln!(out, "<h2>Venue: {}</h2>", text(&r.venue_name))?;
        }
        write_link(&mut out, "Website", &r.venue_website)?;
        write_link(&mut out, "Details", &r.venue_detail_url)?;
        if !r.street_address.is_empty() {
            writeln!(
                out,
                "<p>Address: <a href=\"{}\" target=\"_blank\">{}</a></p>",
                attr(&listing.map_url),
                text(&r.street_address)
            )?;
        }
        if !r.telephone.is_empty() {
            writeln!(
                out,
                "<p>Telephone: <a href=\"tel:{}\">{}</a></p>",
                attr(&r.telephone),
                text(&r.telephone)
            )?;
        }

        let flags = [
            (r.festival, "Festival"),
            (r.free, "Free"),
            (r.kid_friendly, "KidFriendly"),
            (r.last_chance, "LastChance"),
            (r.long_running_show, "LongRunningShow"),
            (r.times_pick, "TimesPick"),
            (r.previews_and_openings, "PreviewsAndOpenings"),
        ];
        if flags.iter().any(|(on, _)| *on) {
            out.push_str("<p>\nDetails:\n");
            for (_, name) in flags.iter().filter(|(on, _)| *on) {
                writeln!(out, "<span>{name}</span>")?;
            }
            out.push_str("</p>\n");
        }

        if !r.recur_days.is_empty() {
            out.push_str("<p>Days: ");
            for day in &r.recur_days {
                write!(out, "<span>{}</span>", text(day))?;
            }
            if let Some(since) = &r.recurring_start_date {
                write!(out, " (since {})", short_date(since))?;
            }
            out.push_str("</p>\n");
        }

        if let Some(ts) = &r.last_modified {
            writeln!(out, "<p class=\"subdetails\">Last Modified: {}</p>", nice_date(ts))?;
        }
        out.push_str("</div>\n");
        Ok(out)
    }
}

fn write_link(out: &mut String, label: &str, url: &str) -> Result<(), RenderError> {
    if url.is_empty() {
        return Ok(());
    }
    writeln!(
        out,
        "<p>{label}: <a href=\"{}\" target=\"_blank\">{}</a></p>",
        attr(&with_scheme(url)),
        text(url)
    )?;
    Ok(())
}
