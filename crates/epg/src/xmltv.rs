//! XMLTV document writer.

use quick_xml::escape::escape;
use serde::Deserialize;

use epg_core::{Channel, ChannelId, EpisodeNumber, ProgramDetail};

use crate::categories::dvb_categories;
use crate::render::ProgrammeRecord;

/// XMLTV timestamp format.
const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";

/// Zero based season numbers from this value on are provider placeholders.
const PLACEHOLDER_SEASON: u32 = 99_999;

/// Zero based episode numbers from this value on are provider placeholders.
const PLACEHOLDER_EPISODE: u32 = 9_999_999;

fn default_lang() -> String {
    "nl".to_string()
}

fn default_source_info_url() -> String {
    "https://www.ziggogo.tv".to_string()
}

fn default_source_info_name() -> String {
    "ZiggoGo".to_string()
}

fn default_generator_info_name() -> String {
    "ZiggoGo EPG".to_string()
}

fn default_generator_info_url() -> String {
    "https://github.com/jbogers/ziggogo-epg".to_string()
}

fn default_rating_system() -> String {
    "Kijkwijzer".to_string()
}

/// Document level settings of the XMLTV output.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XmltvOptions {
    /// Language of all text elements.
    pub lang: String,
    /// `source-info-url` attribute.
    pub source_info_url: String,
    /// `source-info-name` attribute.
    pub source_info_name: String,
    /// `generator-info-name` attribute.
    pub generator_info_name: String,
    /// `generator-info-url` attribute.
    pub generator_info_url: String,
    /// `system` attribute of `<rating>`.
    pub rating_system: String,
    /// Add DVB content categories next to the provider genres.
    pub dvb_categories: bool,
}

impl Default for XmltvOptions {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            source_info_url: default_source_info_url(),
            source_info_name: default_source_info_name(),
            generator_info_name: default_generator_info_name(),
            generator_info_url: default_generator_info_url(),
            rating_system: default_rating_system(),
            dvb_categories: false,
        }
    }
}

/// XMLTV channel id for a provider channel id.
#[must_use]
pub fn xmltv_channel_id(id: &ChannelId) -> String {
    id.as_str().replace('_', ".")
}

/// Formats season/episode numbers in the zero based `xmltv_ns` system.
///
/// Returns `None` when neither number is known or either is a placeholder.
#[must_use]
pub fn xmltv_ns(episode: &EpisodeNumber) -> Option<String> {
    let season = episode.season.and_then(|s| s.checked_sub(1));
    let number = episode.episode.and_then(|e| e.checked_sub(1));

    if season.is_some_and(|s| s >= PLACEHOLDER_SEASON)
        || number.is_some_and(|e| e >= PLACEHOLDER_EPISODE)
    {
        return None;
    }
    if season.is_none() && number.is_none() {
        return None;
    }

    let part = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
    Some(format!("{}.{}.", part(season), part(number)))
}

/// Writes channels and programme records as one XMLTV document.
#[derive(Clone, Debug, Default)]
pub struct XmltvWriter {
    options: XmltvOptions,
}

impl XmltvWriter {
    /// Create a writer with the given options.
    #[must_use]
    pub const fn new(options: XmltvOptions) -> Self {
        Self { options }
    }

    /// Returns the writer options.
    #[must_use]
    pub const fn options(&self) -> &XmltvOptions {
        &self.options
    }

    /// Builds the complete document.
    #[must_use]
    pub fn write_document(&self, channels: &[Channel], records: &[ProgrammeRecord]) -> String {
        let o = &self.options;
        let mut out = String::with_capacity(256 + channels.len() * 160 + records.len() * 512);

        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
        out.push_str(&format!(
            "<tv source-info-url=\"{}\" source-info-name=\"{}\" generator-info-name=\"{}\" generator-info-url=\"{}\">\n",
            escape(&o.source_info_url),
            escape(&o.source_info_name),
            escape(&o.generator_info_name),
            escape(&o.generator_info_url),
        ));

        for channel in channels {
            self.write_channel(&mut out, channel);
        }
        for record in records {
            self.write_programme(&mut out, record);
        }

        out.push_str("</tv>\n");
        out
    }

    fn write_channel(&self, out: &mut String, channel: &Channel) {
        out.push_str(&format!(
            "  <channel id=\"{}\">\n",
            escape(&xmltv_channel_id(&channel.id))
        ));
        out.push_str(&format!(
            "    <display-name lang=\"{}\">{}</display-name>\n",
            escape(&self.options.lang),
            escape(&channel.name)
        ));
        if let Some(logo) = &channel.logo {
            out.push_str(&format!("    <icon src=\"{}\"/>\n", escape(logo)));
        }
        out.push_str("  </channel>\n");
    }

    fn write_programme(&self, out: &mut String, record: &ProgrammeRecord) {
        out.push_str(&format!(
            "  <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
            record.start.format(XMLTV_TIME_FORMAT),
            record.stop.format(XMLTV_TIME_FORMAT),
            escape(&xmltv_channel_id(&record.channel_id))
        ));
        self.text_element(out, "title", &record.title);

        if let Some(detail) = &record.detail {
            self.write_detail(out, detail);
        }

        out.push_str("  </programme>\n");
    }

    fn write_detail(&self, out: &mut String, detail: &ProgramDetail) {
        if let Some(sub_title) = &detail.sub_title {
            self.text_element(out, "sub-title", sub_title);
        }
        if let Some(description) = &detail.description {
            self.text_element(out, "desc", description);
        }

        let credits = &detail.credits;
        if !credits.is_empty() {
            out.push_str("    <credits>\n");
            for (tag, people) in [
                ("director", &credits.directors),
                ("actor", &credits.actors),
                ("producer", &credits.producers),
            ] {
                for person in people {
                    out.push_str(&format!("      <{tag}>{}</{tag}>\n", escape(person)));
                }
            }
            out.push_str("    </credits>\n");
        }

        if let Some(date) = &detail.date {
            out.push_str(&format!("    <date>{}</date>\n", escape(date)));
        }

        for category in &detail.categories {
            self.text_element(out, "category", category);
        }
        if self.options.dvb_categories {
            for category in dvb_categories(&detail.categories) {
                out.push_str(&format!(
                    "    <category lang=\"en\">{}</category>\n",
                    escape(category)
                ));
            }
        }

        if let Some(country) = &detail.country {
            out.push_str(&format!("    <country>{}</country>\n", escape(country)));
        }

        if let Some(episode) = detail.episode.as_ref().and_then(xmltv_ns) {
            out.push_str(&format!(
                "    <episode-num system=\"xmltv_ns\">{}</episode-num>\n",
                episode
            ));
        }

        if let Some(rating) = &detail.rating {
            out.push_str(&format!(
                "    <rating system=\"{}\">\n      <value>{}</value>\n    </rating>\n",
                escape(&self.options.rating_system),
                escape(rating)
            ));
        }
    }

    fn text_element(&self, out: &mut String, tag: &str, text: &str) {
        out.push_str(&format!(
            "    <{tag} lang=\"{}\">{}</{tag}>\n",
            escape(&self.options.lang),
            escape(text)
        ));
    }
}
