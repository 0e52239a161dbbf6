//! Structural clean (§4.3 step 1) and target focus (§4.3 step 2).
//!
//! Tag stripping and external-link/media exclusion run as a single
//! streaming `lol_html` rewrite pass — cheaper than a full DOM mutation
//! pass for what is just tag deletion — then `scraper` walks the cleaned
//! HTML once to collect `media`/`links`/`tables` for the result.

use std::collections::HashSet;

use lol_html::{element, rewrite_str, RewriteStrSettings};
use scraper::{Html, Selector};
use url::Url;

use crawlforge_types::result::{AudioMedia, ImageMedia, Link, Links, Media, VideoMedia};

use crate::table::collect_tables;

pub struct ScrapeConfig<'a> {
    pub excluded_tags: &'a [String],
    pub exclude_external_links: bool,
    pub exclude_external_images: bool,
    /// The URL relative links and host comparisons are resolved against
    /// (Invariant e: `redirected_url`, never the input URL).
    pub base_url: &'a str,
}

pub struct ScrapeOutput {
    pub cleaned_html: String,
    pub media: Media,
    pub links: Links,
}

/// Runs the structural clean and collects media/links from the result.
pub fn scrape(html: &str, cfg: &ScrapeConfig<'_>) -> ScrapeOutput {
    let cleaned_html = strip_tags(html, cfg);
    let base = Url::parse(cfg.base_url).ok();
    let media = collect_media(&cleaned_html, base.as_ref());
    let links = collect_links(&cleaned_html, base.as_ref(), cfg.exclude_external_links);

    ScrapeOutput { cleaned_html, media, links }
}

fn strip_tags(html: &str, cfg: &ScrapeConfig<'_>) -> String {
    let base_host = Url::parse(cfg.base_url).ok().and_then(|u| u.host_str().map(str::to_string));
    let mut excluded: HashSet<&str> = cfg.excluded_tags.iter().map(String::as_str).collect();
    excluded.insert("script");
    excluded.insert("style");

    let mut handlers = Vec::new();
    for tag in &excluded {
        handlers.push(element!(*tag, |el| {
            el.remove();
            Ok(())
        }));
    }

    if cfg.exclude_external_links {
        let host = base_host.clone();
        handlers.push(element!("a[href]", move |el| {
            if let Some(href) = el.get_attribute("href") {
                if is_external(&href, host.as_deref()) {
                    el.remove();
                }
            }
            Ok(())
        }));
    }

    if cfg.exclude_external_images {
        let host = base_host.clone();
        handlers.push(element!("img[src]", move |el| {
            if let Some(src) = el.get_attribute("src") {
                if is_external(&src, host.as_deref()) {
                    el.remove();
                }
            }
            Ok(())
        }));
    }

    rewrite_str(html, RewriteStrSettings { element_content_handlers: handlers, ..RewriteStrSettings::new() })
        .unwrap_or_else(|_| html.to_string())
}

fn is_external(raw: &str, base_host: Option<&str>) -> bool {
    let Some(base_host) = base_host else { return false };
    match Url::parse(raw) {
        Ok(url) => url.host_str().map(|h| h != base_host).unwrap_or(false),
        Err(_) => false,
    }
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

fn collect_links(html: &str, base: Option<&Url>, exclude_external: bool) -> Links {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");
    let base_host = base.and_then(|b| b.host_str());

    let mut internal = Vec::new();
    let mut external = Vec::new();

    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else { continue };
        if href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let resolved = resolve(base, href);
        let text = el.text().collect::<Vec<_>>().join(" ").trim().to_string();
        let link = Link {
            href: resolved.clone(),
            text: if text.is_empty() { None } else { Some(text) },
            title: el.value().attr("title").map(str::to_string),
            score: None,
        };

        let is_external = Url::parse(&resolved)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .map(|h| Some(h.as_str()) != base_host)
            .unwrap_or(false);

        if is_external {
            if !exclude_external {
                external.push(link);
            }
        } else {
            internal.push(link);
        }
    }

    Links { internal, external }
}

fn collect_media(html: &str, base: Option<&Url>) -> Media {
    let document = Html::parse_document(html);

    let img_selector = Selector::parse("img[src]").expect("static selector");
    let images = document
        .select(&img_selector)
        .map(|el| ImageMedia {
            src: resolve(base, el.value().attr("src").unwrap_or_default()),
            alt: el.value().attr("alt").map(str::to_string),
            width: el.value().attr("width").and_then(|w| w.parse().ok()),
            height: el.value().attr("height").and_then(|h| h.parse().ok()),
            score: None,
        })
        .collect();

    let video_selector = Selector::parse("video").expect("static selector");
    let videos = document
        .select(&video_selector)
        .filter_map(|el| {
            el.value().attr("src").or_else(|| {
                el.select(&Selector::parse("source").unwrap())
                    .next()
                    .and_then(|s| s.value().attr("src"))
            })
        })
        .map(|src| VideoMedia {
            src: resolve(base, src),
            poster: None,
        })
        .collect();

    let audio_selector = Selector::parse("audio[src]").expect("static selector");
    let audio = document
        .select(&audio_selector)
        .map(|el| AudioMedia { src: resolve(base, el.value().attr("src").unwrap_or_default()) })
        .collect();

    let tables = collect_tables(&document);

    Media { images, videos, audio, tables }
}

/// Target focus (§4.3 step 2): `css_selector` restricts the whole output
/// (links/media draw from the full page regardless); `target_elements`
/// restricts only markdown/extraction input.
pub fn apply_css_selector(html: &str, css_selector: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(css_selector) else { return html.to_string() };
    document.select(&selector).map(|el| el.html()).collect::<Vec<_>>().join("\n")
}

pub fn apply_target_elements(html: &str, target_elements: &[String]) -> String {
    if target_elements.is_empty() {
        return html.to_string();
    }
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for selector_str in target_elements {
        if let Ok(selector) = Selector::parse(selector_str) {
            for el in document.select(&selector) {
                out.push(el.html());
            }
        }
    }
    out.join("\n")
}
