//! Platform URL layout

pub const BASE_URL: &str = "https://www.youtube.com";
pub const BROWSE_API_URL: &str = "https://www.youtube.com/youtubei/v1/browse";

pub fn watch_url(video_id: &str) -> String {
    format!("{BASE_URL}/watch?v={video_id}")
}

pub fn shorts_url(video_id: &str) -> String {
    format!("{BASE_URL}/shorts/{video_id}")
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("{BASE_URL}/playlist?list={playlist_id}")
}

pub fn post_url(post_id: &str) -> String {
    format!("{BASE_URL}/post/{post_id}")
}

/// Channel home for a handle, with or without the leading `@`
pub fn channel_url(handle: &str) -> String {
    format!("{BASE_URL}/@{}", handle.trim_start_matches('@'))
}

pub fn channel_tab_url(handle: &str, tab: &str) -> String {
    format!("{}/{tab}", channel_url(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        assert_eq!(channel_url("@somechannel"), "https://www.youtube.com/@somechannel");
        assert_eq!(
            channel_tab_url("somechannel", "streams"),
            "https://www.youtube.com/@somechannel/streams"
        );
        assert_eq!(playlist_url("PL1"), "https://www.youtube.com/playlist?list=PL1");
        assert_eq!(watch_url("abc"), "https://www.youtube.com/watch?v=abc");
    }
}
