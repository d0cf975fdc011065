use speedpick::catalog::{select, ServerCatalog};
use speedpick::config::CountryMatch;
use speedpick::locate::Location;

fn fixture_catalog() -> String {
    r#"
    [
      {"id": 4010, "host": "speedtest.tele2.lv:8080", "country": "Latvia", "city": "Riga", "sponsor": "Tele2"},
      {"id": 4011, "host": "speedtest.bite.lv:8080", "country": "Latvia", "city": "Riga", "sponsor": "Bite"},
      {"id": 5120, "host": "speedtest.elisa.ee:8080", "country": "Estonia", "city": "Tallinn"},
      {"id": 5121, "host": "speedtest.telia.ee:8080", "country": "Estonia", "city": "Tartu"},
      {"id": 5122, "host": "speedtest.tet.ee:8080", "country": "Estonia", "city": "Narva"},
      {"id": 6001, "host": "speedtest.cgates.lt:8080", "country": "Lithuania", "city": "Vilnius"}
    ]
    "#
    .to_string()
}

fn located(country: Option<&str>, city: Option<&str>) -> Location {
    Location {
        country: country.map(str::to_string),
        city: city.map(str::to_string),
    }
}

#[test]
fn test_first_city_match_wins() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(Some("Latvia"), Some("Riga")), &catalog, CountryMatch::LastWins);
    assert_eq!(chosen.id, 4010);
}

#[test]
fn test_city_match_beats_later_country_match() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(Some("Estonia"), Some("Vilnius")), &catalog, CountryMatch::LastWins);
    assert_eq!(chosen.id, 6001);
}

#[test]
fn test_country_only_match_takes_last_entry() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(Some("Estonia"), Some("Parnu")), &catalog, CountryMatch::LastWins);
    assert_eq!(chosen.id, 5122);
}

#[test]
fn test_country_only_match_first_wins_when_configured() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(Some("Estonia"), Some("Parnu")), &catalog, CountryMatch::FirstWins);
    assert_eq!(chosen.id, 5120);
}

#[test]
fn test_no_match_returns_first_entry() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(Some("Finland"), Some("Helsinki")), &catalog, CountryMatch::LastWins);
    assert_eq!(chosen.id, 4010);
}

#[test]
fn test_null_location_returns_first_entry() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    let chosen = select(&located(None, None), &catalog, CountryMatch::LastWins);
    assert_eq!(chosen.id, 4010);
}

#[test]
fn test_by_id_lookup() {
    let catalog = ServerCatalog::load(fixture_catalog().as_bytes()).expect("Parse failed");
    assert_eq!(catalog.by_id(5121).map(|s| s.city.as_str()), Some("Tartu"));
    assert!(catalog.by_id(99).is_none());
}
