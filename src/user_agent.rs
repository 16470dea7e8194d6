//! Randomized browser user agents handed to the external archiving tool.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::ARCHIVAL_USER_AGENT;

const WINDOWS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64",
    "Windows NT 10.0",
];

const MAC: &[&str] = &[
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 11_6_5",
    "Macintosh; Intel Mac OS X 12_4",
    "Macintosh; Intel Mac OS X 13_3",
];

const LINUX: &[&str] = &[
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
    "X11; Fedora; Linux x86_64",
];

const MOBILE: &[&str] = &[
    "Linux; Android 13; SM-G998B",
    "Linux; Android 12; Pixel 6 Pro",
    "Linux; Android 11; OnePlus 8T",
    "Linux; Android 10; Mi 10",
    "iPhone; CPU iPhone OS 16_6_1 like Mac OS X",
    "iPhone; CPU iPhone OS 15_4_1 like Mac OS X",
];

#[derive(Debug, Clone, Copy)]
enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Mobile,
}

const BROWSERS: &[Browser] = &[
    Browser::Chrome,
    Browser::Firefox,
    Browser::Safari,
    Browser::Edge,
    Browser::Mobile,
];

/// A plausible user agent for a recent desktop or mobile browser.
#[must_use]
pub fn random_user_agent() -> String {
    random_user_agent_with(&mut rand::thread_rng())
}

fn random_user_agent_with<R: Rng>(rng: &mut R) -> String {
    let desktop: Vec<&'static str> = WINDOWS
        .iter()
        .chain(MAC)
        .chain(LINUX)
        .copied()
        .collect();

    let Some(browser) = BROWSERS.choose(rng).copied() else {
        return ARCHIVAL_USER_AGENT.to_string();
    };

    match browser {
        Browser::Chrome => {
            let platform = pick(rng, &desktop);
            let (major, minor) = (rng.gen_range(100..125), rng.gen_range(0..5));
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.{minor}.0.0 Safari/537.36"
            )
        }
        Browser::Firefox => {
            let platform = pick(rng, &desktop);
            let major = rng.gen_range(90..120);
            format!(
                "Mozilla/5.0 ({platform}; rv:{major}.0) Gecko/20100101 Firefox/{major}.0"
            )
        }
        Browser::Safari => {
            let platform = pick(rng, MAC);
            let (major, minor) = (rng.gen_range(14..17), rng.gen_range(0..6));
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{major}.{minor} Safari/605.1.15"
            )
        }
        Browser::Edge => {
            let platform = pick(rng, WINDOWS);
            let major = rng.gen_range(100..125);
            let minor = rng.gen_range(0..5);
            let patch = rng.gen_range(1000..1100);
            let build = rng.gen_range(50..70);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.0.0 Safari/537.36 Edg/{major}.{minor}.{patch}.{build}"
            )
        }
        Browser::Mobile => {
            let platform = pick(rng, MOBILE);
            let (major, minor) = (rng.gen_range(100..125), rng.gen_range(0..5));
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.{minor}.0.0 Mobile Safari/537.36"
            )
        }
    }
}

fn pick<R: Rng>(rng: &mut R, list: &[&'static str]) -> &'static str {
    list.choose(rng).copied().unwrap_or(WINDOWS[0])
}
