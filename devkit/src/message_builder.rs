/*!
Helpers pour construire les messages du protocole superviseur/contrôle

Les tests décrivent des commandes (heartbeat, shutdown, set, get...) sans
assembler les corps de messages à la main.
*/

use comptask_core::{
    DatumId, EndpointId, Message, MessageClass, Service, SetCommand, StatusCode, Timestamp, Units,
};

/// Construit des messages adressés à une tâche donnée
#[derive(Debug, Clone, Copy)]
pub struct MessageBuilder {
    target: EndpointId,
}

impl MessageBuilder {
    pub fn new(target: EndpointId) -> Self {
        Self { target }
    }

    pub fn command(&self, from: EndpointId, service: Service, seq_num: u32) -> Message {
        Message::new(from, self.target, MessageClass::Cmd, service, seq_num)
    }

    pub fn heartbeat(&self, from: EndpointId, seq_num: u32) -> Message {
        self.command(from, Service::HEARTBEAT, seq_num)
    }

    pub fn shutdown(&self, from: EndpointId, seq_num: u32) -> Message {
        self.command(from, Service::SHUTDOWN, seq_num)
    }

    pub fn safe_state(&self, from: EndpointId, seq_num: u32) -> Message {
        self.command(from, Service::SAFESTATE, seq_num)
    }

    pub fn activate(&self, from: EndpointId, seq_num: u32) -> Message {
        self.command(from, Service::ACTIVATE, seq_num)
    }

    /// Commande `set` immédiate
    pub fn set(&self, from: EndpointId, seq_num: u32, datum: DatumId, value: i32, units: Units) -> Message {
        self.set_with(from, seq_num, SetCommand::immediate(datum, value, units))
    }

    /// Commande `set` avec un corps arbitraire (statut, horodatage...)
    pub fn set_with(&self, from: EndpointId, seq_num: u32, payload: SetCommand) -> Message {
        self.command(from, Service::SET, seq_num).with_body(payload.encode())
    }

    pub fn get(&self, from: EndpointId, seq_num: u32, datum: DatumId) -> Message {
        let payload = SetCommand::immediate(datum, 0, Units::NoUnits);
        self.command(from, Service::GET, seq_num).with_body(payload.encode())
    }

    /// Réponse de la base de statut à une soumission
    pub fn submit_outcome(&self, database: EndpointId, seq_num: u32, class: MessageClass, code: Option<StatusCode>) -> Message {
        let body = code.map(|c| vec![c.as_word()]).unwrap_or_default();
        Message::new(database, self.target, class, Service::SUBMIT, seq_num).with_body(body)
    }
}

/// Set non immédiat (horodatage non nul)
pub fn scheduled_set(datum: DatumId, value: i32, units: Units, at: Timestamp) -> SetCommand {
    SetCommand { timestamp: at, ..SetCommand::immediate(datum, value, units) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_addresses_target() {
        let builder = MessageBuilder::new(EndpointId(147));
        let hb = builder.heartbeat(EndpointId(2), 5);
        assert_eq!(hb.dest, EndpointId(147));
        assert_eq!(hb.class, MessageClass::Cmd);
        assert_eq!(hb.seq_num, 5);
        assert!(hb.body.is_empty());

        let set = builder.set(EndpointId(1), 6, DatumId(8), 1, Units::TrueFalse);
        let payload = SetCommand::decode(&set.body).unwrap();
        assert_eq!(payload.param_low, 1);
        assert!(payload.timestamp.is_zero());
    }

    #[test]
    fn test_scheduled_set_keeps_value() {
        let cmd = scheduled_set(DatumId(8), 1, Units::TrueFalse, Timestamp::new(3, 0));
        assert_eq!(cmd.param_low, 1);
        assert!(!cmd.timestamp.is_zero());
    }
}
