//! Routing of messages received from a plug-in.

use tracing::{debug, warn};

use crate::protocol::{
    CallMode, FileHandlerDef, Message, ProcCall, ProcResult, ProcedureDef, ProcedureKind,
};
use crate::registry::ProcedureOwner;

use super::{PROCESS_TARGET, PlugInProcess};

impl PlugInProcess {
    /// Handles one message read from the plug-in.
    pub(super) fn handle_message(&self, message: Message) {
        debug!(
            target: PROCESS_TARGET,
            plug_in = %self.path.display(),
            message = message.kind(),
            "received message"
        );
        match message {
            Message::Quit => self.close(false),
            Message::ProcReturn(result) => self.handle_proc_return(result),
            Message::TempProcReturn(result) => self.handle_temp_proc_return(result),
            Message::ProcRun(call) => self.handle_proc_run(call),
            Message::ProcInstall(def) => self.handle_proc_install(def),
            Message::ProcUninstall { name } => self.handle_proc_uninstall(&name),
            Message::RegisterFileHandler(def) => self.handle_file_handler(&def),
            Message::ExtensionAck => {
                self.extension_ready.set(true);
                self.extension_notify.notify_one();
            }
            Message::HasInit => {
                if self.mode.get() == Some(CallMode::Query) {
                    self.has_init.set(true);
                } else {
                    self.ignore("has_init is only meaningful during query");
                }
            }
            Message::ContextPush => self.frames.current().push_context(),
            Message::ContextPop => {
                if !self.frames.current().pop_context() {
                    self.ignore("context_pop without a matching context_push");
                }
            }
            Message::Config(_) | Message::TempProcRun(_) => {
                self.protocol_violation(message.kind());
            }
        }
    }

    fn handle_proc_return(&self, result: ProcResult) {
        let main = self.frames.main();
        main.set_return_values(result.into_return_values());
        main.quit_blocking();
    }

    fn handle_temp_proc_return(&self, result: ProcResult) {
        let Some(frame) = self.frames.top_temporary() else {
            self.protocol_violation("temp_proc_return");
            return;
        };
        frame.set_return_values(result.into_return_values());
        frame.quit_blocking();
        drop(self.frames.pop(&frame));
    }

    fn handle_proc_run(&self, call: ProcCall) {
        let Some(manager) = self.manager() else {
            return;
        };
        let frame = self.frames.current();
        let context = frame.context();
        if self.synchronous.get() {
            let values = manager.call_host_procedure(&call.name, &context, &call.args);
            self.reply(ProcResult::from_return_values(call.name, values));
            return;
        }
        let Some(plug_in) = self.weak_self.upgrade() else {
            return;
        };
        let progress = frame.progress();
        tokio::task::spawn_local(async move {
            let ProcCall { name, args } = call;
            let values = manager
                .run_procedure(&name, &context, progress, args)
                .await;
            if plug_in.is_open() {
                plug_in.reply(ProcResult::from_return_values(name, values));
            }
        });
    }

    fn reply(&self, result: ProcResult) {
        if let Err(err) = self.send_all(&[Message::ProcReturn(result)]) {
            warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                error = %err,
                "failed to return procedure values"
            );
            self.close(true);
        }
    }

    fn handle_proc_install(&self, def: ProcedureDef) {
        let running = self.mode.get() == Some(CallMode::Run);
        let temporary = def.kind == ProcedureKind::Temporary;
        if temporary && !running {
            self.ignore("temporary procedures can only be installed while running");
            return;
        }
        if !temporary && running {
            self.ignore("permanent procedures can only be installed during query or init");
            return;
        }
        let Some(manager) = self.manager() else {
            return;
        };
        let owner = if temporary {
            ProcedureOwner::open_plug_in(self.path.clone(), self.id)
        } else {
            ProcedureOwner::new(self.path.clone())
        };
        let name = def.name.clone();
        match manager.registry_mut().install(def, owner) {
            Ok(()) => debug!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                procedure = name,
                "installed procedure"
            ),
            Err(err) => warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                error = %err,
                "rejected procedure"
            ),
        }
    }

    fn handle_proc_uninstall(&self, name: &str) {
        let Some(manager) = self.manager() else {
            return;
        };
        let owner = ProcedureOwner::open_plug_in(self.path.clone(), self.id);
        if let Err(err) = manager.registry_mut().uninstall_temporary(name, &owner) {
            warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                error = %err,
                "rejected procedure removal"
            );
        }
    }

    fn handle_file_handler(&self, def: &FileHandlerDef) {
        let Some(manager) = self.manager() else {
            return;
        };
        if let Err(err) = manager.registry_mut().set_file_handler(def, &self.path) {
            warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                error = %err,
                "rejected file handler"
            );
        }
    }

    fn ignore(&self, reason: &str) {
        warn!(target: PROCESS_TARGET, plug_in = %self.path.display(), "ignoring message: {reason}");
    }

    fn protocol_violation(&self, kind: &str) {
        self.crashed.set(true);
        warn!(
            target: PROCESS_TARGET,
            plug_in = %self.path.display(),
            message = kind,
            "plug-in sent a message it must not send"
        );
        if let Some(manager) = self.manager() {
            manager.notify(
                &self.path,
                &format!(
                    "Plug-in \"{}\"\n({})\n\nsent an unexpected '{kind}' message and was \
                     terminated.",
                    self.name(),
                    self.path.display()
                ),
            );
        }
        self.close(true);
    }
}
