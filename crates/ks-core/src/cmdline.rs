//! Command-line flags and renderer keyword extraction

use crate::config::{GameMode, VideoMode};
use crate::settings::ConfigLayer;
use tracing::debug;

/// Renderer keyword table, indexed by keyword number
///
/// Index 0 is an empty placeholder that never matches and index 1 is skipped
/// during extraction.
pub const RENDER_KEYWORDS: [&str; 6] = ["", "-client", "-w", "-d3d", "-opengl", "-glide"];

/// Keyword index that extraction never reports
pub const SKIPPED_RENDER_KEYWORD: usize = 1;

/// Keyword index used when no token matches
pub const DEFAULT_RENDER_KEYWORD: u32 = 4;

/// Resolution forced by the windowed flag
pub const WINDOWED_RESOLUTION: (u32, u32) = (640, 480);

/// Flags recognized on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name as invoked
    pub program: String,
    /// Jump straight into networked mode, bypassing the menu
    pub skip_to_bnet: bool,
    pub no_sound: bool,
    pub no_music: bool,
    /// Last renderer flag wins
    pub video_mode: Option<VideoMode>,
    pub windowed: bool,
    /// Arguments that did not match any flag
    pub unrecognized: Vec<String>,
}

impl CommandLine {
    /// Parse an argument vector, `args[0]` being the program name
    ///
    /// Flags are case-insensitive. Unknown arguments are kept in
    /// [`unrecognized`](Self::unrecognized) and otherwise ignored.
    pub fn parse(args: &[String]) -> Self {
        let mut cmdline = Self {
            program: args.first().cloned().unwrap_or_default(),
            ..Self::default()
        };

        for arg in args.iter().skip(1) {
            match arg.to_ascii_lowercase().as_str() {
                "-skiptobnet" => cmdline.skip_to_bnet = true,
                "-ns" | "-nosound" => cmdline.no_sound = true,
                "-nm" | "-nomusic" => cmdline.no_music = true,
                "-d3d" => cmdline.video_mode = Some(VideoMode::Direct3D),
                "-opengl" => cmdline.video_mode = Some(VideoMode::OpenGl),
                "-3dfx" | "-glide" => cmdline.video_mode = Some(VideoMode::Glide),
                "-w" => cmdline.windowed = true,
                _ => {
                    cmdline.unrecognized.push(arg.clone());
                    continue;
                }
            }
            debug!("Command-line flag: {}", arg);
        }

        cmdline
    }

    /// Express the flags as the highest-precedence configuration tier
    ///
    /// Only flags that were actually given produce a value.
    pub fn to_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            video_mode: self.video_mode,
            ..ConfigLayer::default()
        };
        if self.skip_to_bnet {
            layer.game_mode = Some(GameMode::BattleNet);
            layer.skip_menu = Some(true);
        }
        if self.no_sound {
            layer.no_sound = Some(true);
        }
        if self.no_music {
            layer.no_music = Some(true);
        }
        if self.windowed {
            layer.windowed = Some(true);
            layer.screen_width = Some(WINDOWED_RESOLUTION.0);
            layer.screen_height = Some(WINDOWED_RESOLUTION.1);
        }
        layer
    }
}

/// Extract the renderer keyword index from a raw command line
///
/// The line is split on whitespace and every token is compared against
/// [`RENDER_KEYWORDS`] as a prefix. Within a token the first matching keyword
/// wins; a later matching token overwrites an earlier one. The keyword at
/// [`SKIPPED_RENDER_KEYWORD`] is never reported.
pub fn extract_render_keyword(command_line: &str) -> u32 {
    let mut index = DEFAULT_RENDER_KEYWORD;

    for token in command_line.split_whitespace() {
        let hit = RENDER_KEYWORDS
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != SKIPPED_RENDER_KEYWORD)
            .find(|(_, keyword)| !keyword.is_empty() && token.starts_with(**keyword));

        if let Some((i, keyword)) = hit {
            debug!("Render keyword {} (index {}) from token {:?}", keyword, i, token);
            index = i as u32;
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let cmdline = CommandLine::parse(&args(&["game", "-NS", "-nomusic", "-d3d", "-opengl", "-foo"]));
        assert_eq!(cmdline.program, "game");
        assert!(cmdline.no_sound);
        assert!(cmdline.no_music);
        assert!(!cmdline.skip_to_bnet);
        assert_eq!(cmdline.video_mode, Some(VideoMode::OpenGl));
        assert_eq!(cmdline.unrecognized, vec!["-foo".to_string()]);
    }

    #[test]
    fn test_skip_to_bnet_layer() {
        let layer = CommandLine::parse(&args(&["game", "-skiptobnet"])).to_layer();
        assert_eq!(layer.game_mode, Some(GameMode::BattleNet));
        assert_eq!(layer.skip_menu, Some(true));
        assert_eq!(layer.no_sound, None);
    }

    #[test]
    fn test_windowed_layer() {
        let layer = CommandLine::parse(&args(&["game", "-w", "-glide"])).to_layer();
        assert_eq!(layer.windowed, Some(true));
        assert_eq!(layer.screen_width, Some(640));
        assert_eq!(layer.screen_height, Some(480));
        assert_eq!(layer.color_depth, None);
        assert_eq!(layer.video_mode, Some(VideoMode::Glide));
    }

    #[test]
    fn test_render_keyword_default() {
        assert_eq!(extract_render_keyword(""), DEFAULT_RENDER_KEYWORD);
        assert_eq!(extract_render_keyword("-ns -nm"), DEFAULT_RENDER_KEYWORD);
    }

    #[test]
    fn test_render_keyword_skips_client() {
        assert_eq!(extract_render_keyword("-client"), DEFAULT_RENDER_KEYWORD);
        assert_eq!(extract_render_keyword("-client -d3d"), 3);
    }

    #[test]
    fn test_render_keyword_prefix_and_last_token() {
        // "-window" starts with "-w"
        assert_eq!(extract_render_keyword("-window"), 2);
        assert_eq!(extract_render_keyword("-glide -opengl"), 4);
        assert_eq!(extract_render_keyword("-opengl   -glide"), 5);
    }
}
