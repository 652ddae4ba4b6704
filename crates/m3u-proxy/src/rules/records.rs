//! [`Record`] implementations bridging the rule engine to the domain
//! models it is evaluated against (spec §4.3: "Context supplies a record:
//! for stream domain, a Channel + its source metadata; for EPG, an
//! EpgProgram + its source").

use std::borrow::Cow;

use super::evaluator::Record;
use crate::models::{Channel, EpgProgram};

/// A record with no named fields, for domains (client detection) whose
/// expressions only ever reference `@dynamic(...)` data.
pub struct EmptyRecord;

impl Record for EmptyRecord {
    fn get(&self, _field: &str) -> Option<Cow<'_, str>> {
        None
    }

    fn set(&mut self, _field: &str, _value: String) {}
}

impl Record for Channel {
    fn get(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            "tvg_id" => self.tvg_id.as_deref().map(Cow::Borrowed),
            "display_name" => Some(Cow::Borrowed(self.display_name.as_str())),
            "group" => self.group.as_deref().map(Cow::Borrowed),
            "logo_url" => self.logo_url.as_deref().map(Cow::Borrowed),
            "stream_url" => Some(Cow::Borrowed(self.stream_url.as_str())),
            "chno" => self.chno.as_deref().map(Cow::Borrowed),
            other => self.extra_attrs.get(other).map(|s| Cow::Borrowed(s.as_str())),
        }
    }

    fn set(&mut self, field: &str, value: String) {
        match field {
            "tvg_id" => self.tvg_id = Some(value),
            "display_name" => self.display_name = value,
            "group" => self.group = Some(value),
            "logo_url" => self.logo_url = Some(value),
            "stream_url" => self.stream_url = value,
            "chno" => self.chno = Some(value),
            other => {
                self.extra_attrs.insert(other.to_string(), value);
            }
        }
    }
}

impl Record for EpgProgram {
    fn get(&self, field: &str) -> Option<Cow<'_, str>> {
        match field {
            "channel_tvg_id" => Some(Cow::Borrowed(self.channel_tvg_id.as_str())),
            "title" => Some(Cow::Borrowed(self.title.as_str())),
            "sub_title" => self.sub_title.as_deref().map(Cow::Borrowed),
            "description" => self.description.as_deref().map(Cow::Borrowed),
            "category" => self.category.as_deref().map(Cow::Borrowed),
            "icon_url" => self.icon_url.as_deref().map(Cow::Borrowed),
            "episode_num" => self.episode_num.as_deref().map(Cow::Borrowed),
            "rating" => self.rating.as_deref().map(Cow::Borrowed),
            "language" => self.language.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: String) {
        match field {
            "channel_tvg_id" => self.channel_tvg_id = value,
            "title" => self.title = value,
            "sub_title" => self.sub_title = Some(value),
            "description" => self.description = Some(value),
            "category" => self.category = Some(value),
            "icon_url" => self.icon_url = Some(value),
            "episode_num" => self.episode_num = Some(value),
            "rating" => self.rating = Some(value),
            "language" => self.language = Some(value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_id, RuleDomain};
    use crate::rules::{evaluate, parse, NoDynamicContext};

    #[test]
    fn channel_set_action_rewrites_logo() {
        let mut channel = Channel::new(new_id(), "BBC One".to_string(), "http://up/bbc.ts".to_string());
        channel.group = Some("UK".to_string());
        let expr = parse(RuleDomain::Stream, r#"group equals "UK" SET logo_url = "@logo:abc123""#).unwrap();
        evaluate(&expr, &mut channel, &NoDynamicContext);
        assert_eq!(channel.logo_url.as_deref(), Some("@logo:abc123"));
    }
}
