//! Mapping of server-announced game rules onto [`LevelDat`] fields.
//!
//! Names are matched exactly (lowercase, as the server sends them). Integer
//! rules arrive as unsigned values and are stored as `i32`.

use relay_proto::{GameRule, GameRuleValue};

use crate::provider::LevelDat;

/// Every rule name the mapper understands.
pub const KNOWN_RULES: [&str; 30] = [
    "commandblockoutput",
    "maxcommandchainlength",
    "commandblocksenabled",
    "dodaylightcycle",
    "doentitydrops",
    "dofiretick",
    "domobloot",
    "domobspawning",
    "dotiledrops",
    "doweathercycle",
    "drowningdamage",
    "doinsomnia",
    "falldamage",
    "firedamage",
    "keepinventory",
    "mobgriefing",
    "pvp",
    "showcoordinates",
    "naturalregeneration",
    "tntexplodes",
    "sendcommandfeedback",
    "randomtickspeed",
    "doimmediaterespawn",
    "showdeathmessages",
    "functioncommandlimit",
    "spawnradius",
    "showtags",
    "freezedamage",
    "respawnblocksexplode",
    "showbordereffect",
];

/// What happened to one rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied,
    /// Recognized but deliberately not persisted.
    Ignored,
    Unknown,
    /// Recognized, but the value had the wrong type.
    WrongType,
}

fn set_bool(slot: &mut bool, value: &GameRuleValue) -> RuleOutcome {
    match *value {
        GameRuleValue::Bool(v) => {
            *slot = v;
            RuleOutcome::Applied
        }
        _ => RuleOutcome::WrongType,
    }
}

fn set_int(slot: &mut i32, value: &GameRuleValue) -> RuleOutcome {
    match *value {
        GameRuleValue::Int(v) => {
            *slot = v as i32;
            RuleOutcome::Applied
        }
        _ => RuleOutcome::WrongType,
    }
}

/// Apply one rule to `ld`.
pub fn apply_game_rule(ld: &mut LevelDat, rule: &GameRule) -> RuleOutcome {
    let v = &rule.value;
    match rule.name.as_str() {
        "commandblockoutput" => set_bool(&mut ld.command_block_output, v),
        "maxcommandchainlength" => set_int(&mut ld.max_command_chain_length, v),
        "commandblocksenabled" => RuleOutcome::Ignored,
        "dodaylightcycle" => set_bool(&mut ld.do_daylight_cycle, v),
        "doentitydrops" => set_bool(&mut ld.do_entity_drops, v),
        "dofiretick" => set_bool(&mut ld.do_fire_tick, v),
        "domobloot" => set_bool(&mut ld.do_mob_loot, v),
        "domobspawning" => set_bool(&mut ld.do_mob_spawning, v),
        "dotiledrops" => set_bool(&mut ld.do_tile_drops, v),
        "doweathercycle" => set_bool(&mut ld.do_weather_cycle, v),
        "drowningdamage" => set_bool(&mut ld.drowning_damage, v),
        "doinsomnia" => set_bool(&mut ld.do_insomnia, v),
        "falldamage" => set_bool(&mut ld.fall_damage, v),
        "firedamage" => set_bool(&mut ld.fire_damage, v),
        "keepinventory" => set_bool(&mut ld.keep_inventory, v),
        "mobgriefing" => set_bool(&mut ld.mob_griefing, v),
        "pvp" => set_bool(&mut ld.pvp, v),
        "showcoordinates" => set_bool(&mut ld.show_coordinates, v),
        "naturalregeneration" => set_bool(&mut ld.natural_regeneration, v),
        "tntexplodes" => set_bool(&mut ld.tnt_explodes, v),
        "sendcommandfeedback" => set_bool(&mut ld.send_command_feedback, v),
        "randomtickspeed" => set_int(&mut ld.random_tick_speed, v),
        "doimmediaterespawn" => set_bool(&mut ld.do_immediate_respawn, v),
        "showdeathmessages" => set_bool(&mut ld.show_death_messages, v),
        "functioncommandlimit" => set_int(&mut ld.function_command_limit, v),
        "spawnradius" => set_int(&mut ld.spawn_radius, v),
        "showtags" => set_bool(&mut ld.show_tags, v),
        "freezedamage" => set_bool(&mut ld.freeze_damage, v),
        "respawnblocksexplode" => set_bool(&mut ld.respawn_blocks_explode, v),
        "showbordereffect" => set_bool(&mut ld.show_border_effect, v),
        _ => RuleOutcome::Unknown,
    }
}

/// Apply every rule, warning about unknown names and mistyped values.
pub fn apply_game_rules(ld: &mut LevelDat, rules: &[GameRule]) {
    for rule in rules {
        match apply_game_rule(ld, rule) {
            RuleOutcome::Applied | RuleOutcome::Ignored => {}
            RuleOutcome::Unknown => tracing::warn!("unknown game rule {:?}", rule.name),
            RuleOutcome::WrongType => tracing::warn!(
                "game rule {:?} has unexpected value {:?}, skipping",
                rule.name,
                rule.value
            ),
        }
    }
}
