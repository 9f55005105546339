use std::process::ExitCode;

use crawl_engine::sim::{EventSubscriber, Skill};
use crawl_engine::{run_simulation, MetricsHandle};
use tracing::info;

use super::bootstrap::AppWiring;
use super::combat_log::CombatLog;
use super::ledger::PartyLedger;
use super::scenario::{standing_hostiles, ScenarioRun, Side};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        scenario_name,
        config,
        run,
    } = app;
    let ScenarioRun {
        mut simulation,
        roster,
        mut timeline,
        ..
    } = run;

    let mut ledger = PartyLedger::new(simulation.defs());
    let mut combat_log = CombatLog::default();
    for entry in roster.entries() {
        let is_party = entry.side == Side::Party;
        combat_log.register(entry.id, entry.label.clone(), is_party);
        if is_party {
            ledger.register_member(entry.id, entry.label.clone());
        } else if let Some(def) = simulation.defs().creature_def(entry.def_id) {
            ledger.register_bounty(entry.id, def.xp_value, def.gold_drop);
        }
    }

    info!(
        scenario = %scenario_name,
        entity_count = simulation.store().len(),
        order = crawl_engine::sim::SIM_SYSTEM_ORDER_TEXT,
        "scenario_loaded"
    );

    let metrics = MetricsHandle::default();
    let summary = {
        let mut subscribers: [&mut dyn EventSubscriber; 2] = [&mut ledger, &mut combat_log];
        run_simulation(
            &config,
            &mut simulation,
            &mut subscribers,
            &mut timeline,
            &metrics,
        )
    };

    let tally = combat_log.tally();
    let last_metrics = metrics.snapshot();
    info!(
        scenario = %scenario_name,
        ticks = summary.ticks_run,
        stop_reason = ?summary.stop_reason,
        hostiles_left = standing_hostiles(&simulation),
        orders_unissued = timeline.remaining(),
        damage_dealt = tally.damage_dealt,
        damage_taken = tally.damage_taken,
        healing_done = tally.healing_done,
        kills = tally.kills,
        downs = tally.downs,
        wipes = tally.wipes,
        gold = ledger.gold(),
        tps = last_metrics.tps,
        "scenario_finished"
    );
    for (id, progress) in ledger.members() {
        info!(
            member = %progress.label,
            standing = simulation.store().is_standing(id),
            level = progress.level,
            melee = progress.skill_level(Skill::Melee),
            ranged = progress.skill_level(Skill::Ranged),
            combat_magic = progress.skill_level(Skill::CombatMagic),
            nature_magic = progress.skill_level(Skill::NatureMagic),
            "party_member_summary"
        );
    }

    ExitCode::SUCCESS
}
