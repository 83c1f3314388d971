use std::process::ExitCode;
use std::time::Duration;

use maimai_tracker::config::{load_dotenv, ClientConfig};
use maimai_tracker::filter::{filter_scores, sort_scores, FilterSeed, FilterState, ScoreSort};
use maimai_tracker::models::Game;
use maimai_tracker::{ApiError, TrackerClient};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    load_dotenv();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), ApiError> {
    let client = TrackerClient::new(ClientConfig::from_env())?;
    let command = args.first().map(String::as_str).unwrap_or("player");
    match command {
        "login" => {
            let (Some(name), Some(password)) = (args.get(1), args.get(2)) else {
                return Err(ApiError::validation("args", "usage: login <name> <password>"));
            };
            client.login(name, password)?;
            println!("logged in");
        }
        "logout" => {
            client.logout()?;
            println!("logged out");
        }
        "game" => {
            let game = match args.get(1).map(String::as_str) {
                Some("maimai") => Game::Maimai,
                Some("chunithm") => Game::Chunithm,
                _ => return Err(ApiError::validation("args", "usage: game <maimai|chunithm>")),
            };
            client.select_game(game)?;
            println!("selected {game}");
        }
        "player" => {
            let player = client.player(client.game());
            let state = load(&player)?;
            let player = state.ok_or_else(|| ApiError::validation("session", "not logged in"))?;
            println!("{} rating {} (friend code {})", player.name, player.rating, player.friend_code);
        }
        "scores" => {
            // Optional second argument: a filter seed as JSON.
            let filter = match args.get(1) {
                Some(raw) => FilterState::seeded(&FilterSeed::from_json(raw)?),
                None => FilterState::default(),
            };
            let game = client.game();
            // Scores wait for the player, so it has to be subscribed too.
            let _player = client.player(game);
            let scores = client.scores(game);
            let scores = load(&scores)?.unwrap_or_default();
            let mut hits = filter_scores(&filter, &scores);
            sort_scores(&mut hits, ScoreSort::DxRating);
            for score in hits {
                println!(
                    "{:>5} {:<40} {:>4} {:>9.4}% {:>4.0}",
                    score.id, score.song_name, score.level, score.achievements, score.dx_rating
                );
            }
        }
        other => {
            return Err(ApiError::validation(
                "args",
                format!("unknown command {other}; expected login, logout, game, player or scores"),
            ));
        }
    }
    Ok(())
}

fn load<T>(resource: &maimai_tracker::Resource<T>) -> Result<Option<T>, ApiError>
where
    T: Clone + Send + Sync + 'static,
{
    if resource.key().is_none() {
        return Ok(None);
    }
    resource.wait_until(LOAD_TIMEOUT, |state| state.data.is_some() || state.error.is_some());
    let state = resource.state();
    match (state.data, state.error) {
        (Some(data), _) => Ok(Some(data)),
        (None, Some(err)) => Err(err),
        (None, None) => Err(ApiError::Transport("timed out loading data".to_string())),
    }
}
